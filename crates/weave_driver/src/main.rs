use clap::{Args, Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use weave_driver::{Config, OutputKind, Pipeline, PipelineError, render_from_disk};
use weave_lexer::{Lexer, Token};
use weave_model::{BindPath, Diagnostics, Severity};

#[derive(Parser)]
#[command(name = "weave", version, about = "Link and resolve installer intermediates")]
struct Cli {
    /// JSON configuration file; flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also print verbose diagnostics
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Link, resolve and lay out compiled or combined intermediates
    Link {
        inputs: Vec<PathBuf>,

        #[command(flatten)]
        common: CommonArgs,

        /// Cultures to select localizations by, in priority order
        #[arg(long = "culture")]
        cultures: Vec<String>,

        /// Leave undefined variables in place instead of failing
        #[arg(long)]
        allow_unresolved: bool,

        /// Component referenced from outside this link
        #[arg(long = "reference")]
        referenced_components: Vec<String>,
    },

    /// Combine compiled intermediates into a library
    Lib {
        inputs: Vec<PathBuf>,

        #[command(flatten)]
        common: CommonArgs,

        /// Library id; generated from the inputs when omitted
        #[arg(long)]
        id: Option<String>,

        /// Resolve file paths and embed them in the library
        #[arg(long)]
        bind_files: bool,
    },

    /// Show how field text splits into tokens
    Lex { text: String },
}

#[derive(Args)]
struct CommonArgs {
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Search root, `name=path` or a bare path
    #[arg(short = 'b', long = "bindpath")]
    bind_paths: Vec<BindPath>,

    /// Bind variable, `name=value`
    #[arg(short = 'd', long = "define", value_parser = parse_define)]
    defines: Vec<(String, String)>,

    /// Localization file (JSON)
    #[arg(long = "loc")]
    localizations: Vec<PathBuf>,

    #[arg(long)]
    intermediate_folder: Option<PathBuf>,

    #[arg(long)]
    tracking_file: Option<PathBuf>,
}

fn parse_define(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected name=value, got '{}'", s)),
    }
}

impl CommonArgs {
    fn apply(self, config: &mut Config) {
        config.bind_paths.extend(self.bind_paths);
        config.bind_variables.extend(self.defines);
        config.localizations.extend(self.localizations);
        if self.output.is_some() {
            config.output = self.output;
        }
        if self.intermediate_folder.is_some() {
            config.intermediate_folder = self.intermediate_folder;
        }
        if self.tracking_file.is_some() {
            config.tracking_file = self.tracking_file;
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("WEAVE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("error: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };

    let (kind, inputs) = match cli.command {
        Command::Lex { text } => {
            run_lexer(&text);
            return ExitCode::SUCCESS;
        }
        Command::Link { inputs, common, cultures, allow_unresolved, referenced_components } => {
            common.apply(&mut config);
            config.cultures.extend(cultures);
            config.allow_unresolved_variables |= allow_unresolved;
            config.referenced_components.extend(referenced_components);
            (OutputKind::Program, inputs)
        }
        Command::Lib { inputs, common, id, bind_files } => {
            common.apply(&mut config);
            if id.is_some() {
                config.library_id = id;
            }
            config.bind_files |= bind_files;
            (OutputKind::Library, inputs)
        }
    };

    if inputs.is_empty() {
        eprintln!("error: no input intermediates");
        return ExitCode::FAILURE;
    }

    let mut pipeline = Pipeline::new();
    let mut diags = Diagnostics::new();
    let result = pipeline.build(kind, &inputs, &config, &mut diags).await;

    let color = std::io::stderr().is_terminal();
    for message in diags.messages() {
        if message.severity == Severity::Verbose && !cli.verbose {
            continue;
        }
        eprintln!("{}", render_from_disk(message, color));
    }

    match result {
        Ok(built) => {
            println!("wrote {}", built.output.display());
            if !built.delayed_fields.is_empty() {
                println!("{} field(s) wait for bind-time values", built.delayed_fields.len());
            }
            ExitCode::SUCCESS
        }
        // already reported above
        Err(PipelineError::StageFailed { .. }) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn token_type_name(token: &Token) -> &'static str {
    match token {
        Token::EscapedOpen => "EscapedOpen",
        Token::Variable(_) => "Variable",
        Token::Bang => "Bang",
        Token::Text => "Text",
        Token::Eof => "Eof",
    }
}

fn run_lexer(text: &str) {
    let tokens = Lexer::tokenize(text);
    println!("{:<10} {:<8} {:<12} VALUE", "SPAN", "LENGTH", "TOKEN TYPE");
    println!("{}", "-".repeat(60));

    for spanned in &tokens {
        let span = format!("{}..{}", spanned.span.start, spanned.span.end);
        let len = spanned.span.end - spanned.span.start;
        let value = match &spanned.token {
            Token::Variable(var) => var.to_string(),
            _ => text.get(spanned.span.start..spanned.span.end).unwrap_or_default().to_string(),
        };
        println!("{:<10} {:<8} {:<12} {}", span, len, token_type_name(&spanned.token), value);
    }

    let variables = tokens.iter().filter(|t| matches!(t.token, Token::Variable(_))).count();
    println!("\nTotal tokens: {}", tokens.len());
    println!("  Variables: {}", variables);
}
