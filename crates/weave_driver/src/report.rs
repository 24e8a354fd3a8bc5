//! Terminal rendering of diagnostics

use ariadne::{Color, Config, Label, Report, ReportKind, Source};
use std::ops::Range;
use weave_model::{Message, Severity};

fn kind(severity: Severity) -> (ReportKind<'static>, Color) {
    match severity {
        Severity::Error => (ReportKind::Error, Color::Red),
        Severity::Warning => (ReportKind::Warning, Color::Yellow),
        Severity::Verbose => (ReportKind::Advice, Color::Cyan),
    }
}

/// Byte range of a 1-based line, without its terminator
fn line_span(text: &str, line: u32) -> Option<Range<usize>> {
    let index = usize::try_from(line).ok()?.checked_sub(1)?;
    let mut start = 0;
    for (i, content) in text.split('\n').enumerate() {
        if i == index {
            let content = content.strip_suffix('\r').unwrap_or(content);
            return Some(start..start + content.len());
        }
        start += content.len() + 1;
    }
    None
}

/// Render a message with its source line when the source can be read,
/// otherwise as a single plain line
pub fn render(message: &Message, text: Option<&str>, color: bool) -> String {
    let Some((source, line)) = message.source.as_ref().and_then(|s| Some((s, s.line?))) else {
        return message.to_string();
    };
    let Some((text, span)) = text.and_then(|text| Some((text, line_span(text, line)?))) else {
        return message.to_string();
    };

    let file = source.file.clone();
    let (report_kind, label_color) = kind(message.severity);
    let report = Report::build(report_kind, file.clone(), span.start)
        .with_config(Config::default().with_color(color))
        .with_code(format!("WV{:04}", message.id))
        .with_message(&message.text)
        .with_label(Label::new((file.clone(), span)).with_color(label_color))
        .finish();

    let mut out = Vec::new();
    match report.write((file, Source::from(text)), &mut out) {
        Ok(()) => String::from_utf8_lossy(&out).into_owned(),
        Err(_) => message.to_string(),
    }
}

/// Render a message, reading its source file from disk
pub fn render_from_disk(message: &Message, color: bool) -> String {
    let text = message.source.as_ref().and_then(|s| std::fs::read_to_string(&s.file).ok());
    render(message, text.as_deref(), color)
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_model::SourceLineNumber;

    fn message(line: Option<u32>) -> Message {
        Message {
            source: Some(SourceLineNumber { file: "product.wxs".to_string(), line }),
            severity: Severity::Error,
            id: 205,
            text: "unresolved reference to symbol 'Property:Missing'".to_string(),
        }
    }

    #[test]
    fn test_line_span() {
        let text = "first\r\nsecond\nthird";
        assert_eq!(line_span(text, 1), Some(0..5));
        assert_eq!(line_span(text, 2), Some(7..13));
        assert_eq!(line_span(text, 3), Some(14..19));
        assert_eq!(line_span(text, 4), None);
        assert_eq!(line_span(text, 0), None);
    }

    #[test]
    fn test_render_with_source() {
        let text = "<Product>\n  <PropertyRef Id=\"Missing\" />\n</Product>\n";
        let rendered = render(&message(Some(2)), Some(text), false);
        assert!(rendered.contains("WV0205"));
        assert!(rendered.contains("Property:Missing"));
        assert!(rendered.contains("PropertyRef"));
    }

    #[test]
    fn test_render_falls_back_to_plain_text() {
        let plain = "product.wxs(9): error WV0205: unresolved reference to symbol 'Property:Missing'";
        assert_eq!(render(&message(Some(9)), Some("one line\n"), false), plain);
        assert_eq!(render(&message(Some(9)), None, false), plain);
        assert_eq!(
            render(&message(None), Some("x"), false),
            "product.wxs: error WV0205: unresolved reference to symbol 'Property:Missing'"
        );
    }
}
