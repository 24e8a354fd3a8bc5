//! Culture filtering and per-culture defaults

use weave_model::{ExtensionLocalizations, Localization};

/// (culture, LCID, default ANSI codepage)
const CULTURES: &[(&str, u32, i32)] = &[
    ("ar", 1, 1256),
    ("ar-SA", 1025, 1256),
    ("bg-BG", 1026, 1251),
    ("cs-CZ", 1029, 1250),
    ("da-DK", 1030, 1252),
    ("de", 7, 1252),
    ("de-DE", 1031, 1252),
    ("el-GR", 1032, 1253),
    ("en", 9, 1252),
    ("en-GB", 2057, 1252),
    ("en-US", 1033, 1252),
    ("es", 10, 1252),
    ("es-ES", 3082, 1252),
    ("fi-FI", 1035, 1252),
    ("fr", 12, 1252),
    ("fr-FR", 1036, 1252),
    ("he-IL", 1037, 1255),
    ("hu-HU", 1038, 1250),
    ("it-IT", 1040, 1252),
    ("ja", 17, 932),
    ("ja-JP", 1041, 932),
    ("ko-KR", 1042, 949),
    ("nl-NL", 1043, 1252),
    ("nb-NO", 1044, 1252),
    ("pl-PL", 1045, 1250),
    ("pt-BR", 1046, 1252),
    ("pt-PT", 2070, 1252),
    ("ru", 25, 1251),
    ("ru-RU", 1049, 1251),
    ("sv-SE", 1053, 1252),
    ("th-TH", 1054, 874),
    ("tr-TR", 1055, 1254),
    ("uk-UA", 1058, 1251),
    ("zh-CN", 2052, 936),
    ("zh-TW", 1028, 950),
];

/// Known facts about a culture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CultureInfo {
    pub name: &'static str,
    pub lcid: u32,
    pub ansi_codepage: i32,
}

/// Look up a culture, falling back from `xx-YY` to `xx`
pub fn culture_info(culture: &str) -> Option<CultureInfo> {
    let find = |name: &str| {
        CULTURES
            .iter()
            .find(|(c, _, _)| c.eq_ignore_ascii_case(name))
            .map(|&(name, lcid, ansi_codepage)| CultureInfo { name, lcid, ansi_codepage })
    };
    find(culture).or_else(|| find(culture.split('-').next()?))
}

/// Defaults taken from the primary (first) localization
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CultureSettings {
    pub culture: Option<String>,
    pub codepage: Option<i32>,
    pub summary_codepage: Option<i32>,
    pub lcid: Option<u32>,
}

impl CultureSettings {
    pub fn from_primary(localizations: &[Localization]) -> Self {
        let Some(primary) = localizations.first() else {
            return Self::default();
        };
        let info = if primary.is_neutral() { None } else { culture_info(&primary.culture) };
        Self {
            culture: (!primary.is_neutral()).then(|| primary.culture.clone()),
            codepage: primary.codepage.or(info.map(|i| i.ansi_codepage)),
            summary_codepage: primary.summary_codepage.or(info.map(|i| i.ansi_codepage)),
            lcid: info.map(|i| i.lcid),
        }
    }
}

/// Order localizations by culture filter.
///
/// `command_line` holds localizations supplied outside the program; if no
/// filter is given and one of them is language-neutral, neutral data is
/// preferred. A localization matching several filter entries appears once
/// per match.
pub fn filter_localizations(
    filter: &[String],
    command_line: &[Localization],
    program: &[Localization],
    extensions: &[ExtensionLocalizations],
) -> Vec<Localization> {
    let filter: Vec<String> = if filter.is_empty() && command_line.iter().any(Localization::is_neutral) {
        vec![String::new()]
    } else {
        filter.to_vec()
    };

    let collated: Vec<&Localization> = command_line.iter().chain(program).collect();
    let mut result = Vec::new();
    add_filtered(&mut result, &filter, &collated);

    for data in extensions {
        let localizations: Vec<&Localization> = data.localizations.iter().collect();
        match (&data.default_culture, filter.is_empty()) {
            (Some(default), true) => add_filtered(&mut result, std::slice::from_ref(default), &localizations),
            _ => add_filtered(&mut result, &filter, &localizations),
        }
    }

    tracing::debug!(count = result.len(), filter = ?filter, "filtered localizations");
    result
}

fn add_filtered(result: &mut Vec<Localization>, filter: &[String], localizations: &[&Localization]) {
    if filter.is_empty() {
        result.extend(localizations.iter().map(|l| (*l).clone()));
        return;
    }

    for culture in filter {
        result.extend(
            localizations
                .iter()
                .filter(|l| l.culture.eq_ignore_ascii_case(culture))
                .map(|l| (*l).clone()),
        );
    }

    // language-neutral data always applies, after every culture match
    if !filter.iter().any(|culture| culture.is_empty()) {
        result.extend(localizations.iter().filter(|l| l.is_neutral()).map(|l| (*l).clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cultures(list: &[Localization]) -> Vec<&str> {
        list.iter().map(|l| l.culture.as_str()).collect()
    }

    #[test]
    fn test_filter_keeps_neutral_only_when_nothing_matches() {
        let program = vec![Localization::new("en-US"), Localization::new("")];
        let result = filter_localizations(&["fr-FR".to_string()], &[], &program, &[]);
        assert_eq!(cultures(&result), vec![""]);
    }

    #[test]
    fn test_no_filter_keeps_everything_in_order() {
        let program = vec![Localization::new("de-DE"), Localization::new("en-US"), Localization::new("")];
        let result = filter_localizations(&[], &[], &program, &[]);
        assert_eq!(cultures(&result), vec!["de-DE", "en-US", ""]);
    }

    #[test]
    fn test_filter_order_and_case() {
        let program = vec![Localization::new("en-us"), Localization::new("de-DE")];
        let filter = vec!["de-de".to_string(), "EN-US".to_string()];
        let result = filter_localizations(&filter, &[], &program, &[]);
        assert_eq!(cultures(&result), vec!["de-DE", "en-us"]);
    }

    #[test]
    fn test_neutral_command_line_data_wins_without_filter() {
        let command_line = vec![Localization::new("")];
        let program = vec![Localization::new("en-US")];
        let result = filter_localizations(&[], &command_line, &program, &[]);
        assert_eq!(cultures(&result), vec![""]);
    }

    #[test]
    fn test_explicit_neutral_filter_keeps_neutral_once() {
        let program = vec![Localization::new("en-US"), Localization::new("")];
        let result = filter_localizations(&["".to_string()], &[], &program, &[]);
        assert_eq!(cultures(&result), vec![""]);

        let filter = vec!["en-US".to_string(), "".to_string()];
        let result = filter_localizations(&filter, &[], &program, &[]);
        assert_eq!(cultures(&result), vec!["en-US", ""]);
    }

    #[test]
    fn test_extension_default_culture() {
        let ext = ExtensionLocalizations {
            default_culture: Some("ja-JP".to_string()),
            localizations: vec![Localization::new("en-US"), Localization::new("ja-JP")],
        };
        let result = filter_localizations(&[], &[], &[], &[ext]);
        assert_eq!(cultures(&result), vec!["ja-JP"]);
    }

    #[test]
    fn test_primary_settings_fall_back_to_culture() {
        let mut explicit = Localization::new("ru-RU");
        explicit.codepage = Some(65001);
        let settings = CultureSettings::from_primary(&[explicit, Localization::new("en-US")]);
        assert_eq!(settings.codepage, Some(65001));
        assert_eq!(settings.summary_codepage, Some(1251));
        assert_eq!(settings.lcid, Some(1049));

        let neutral = CultureSettings::from_primary(&[Localization::new("")]);
        assert_eq!(neutral, CultureSettings::default());
    }

    #[test]
    fn test_culture_language_fallback() {
        assert_eq!(culture_info("en-AU").map(|c| c.lcid), Some(9));
        assert_eq!(culture_info("xx-YY"), None);
    }
}
