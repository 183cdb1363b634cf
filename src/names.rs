use regex::Regex;
use std::sync::OnceLock;

/// Clean a raw file name into a display title.
///
/// Drops a leading `[group]` tag, trailing `[...]`/`(...)` annotations and a trailing
/// `.mkv`/`.mp4`/`.avi` extension. Brackets in the middle of a title are kept. The
/// pass is repeated until the string stops changing, so `trim_info(trim_info(x)) ==
/// trim_info(x)`.
pub fn trim_info(raw: &str) -> String {
    let mut current = raw.to_string();
    loop {
        let next = trim_pass(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn trim_pass(value: &str) -> String {
    static LEADING_GROUP_RE: OnceLock<Regex> = OnceLock::new();
    static TRAILING_TAG_RE: OnceLock<Regex> = OnceLock::new();
    static EXTENSION_RE: OnceLock<Regex> = OnceLock::new();

    let leading = LEADING_GROUP_RE.get_or_init(|| Regex::new(r"^\[[\w-]+\] ?").unwrap());
    let trailing = TRAILING_TAG_RE.get_or_init(|| {
        Regex::new(r"( ?\[[\s\w-]+\]| ?\([\s\w-]+\))(\.mkv|\.mp4|\.avi)?$").unwrap()
    });
    let extension = EXTENSION_RE.get_or_init(|| Regex::new(r"(?i)\.(mkv|mp4|avi)$").unwrap());

    let mut out = leading.replacen(value.trim(), 1, "").into_owned();
    while trailing.is_match(&out) {
        out = trailing.replace(&out, "${2}").into_owned();
    }
    out = extension.replace(&out, "").into_owned();
    out.trim().to_string()
}

/// Episode number carried in a title such as `Show - 07` or `Show - S01E07`.
pub fn episode_number(title: &str) -> Option<f32> {
    static ITEM_NUMBER_RE: OnceLock<Regex> = OnceLock::new();
    let re = ITEM_NUMBER_RE.get_or_init(|| Regex::new(r" - (?:S\d+E)?(\d+)").unwrap());
    re.captures(&trim_info(title))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Decimal human-readable size, e.g. `2.00 GB`. Zero yields an empty string.
pub fn format_file_size(bytes: u64) -> String {
    match bytes {
        b if b >= 1_000_000_000 => format!("{:.2} GB", b as f64 / 1_000_000_000.0),
        b if b >= 1_000_000 => format!("{:.2} MB", b as f64 / 1_000_000.0),
        b if b >= 1_000 => format!("{:.2} KB", b as f64 / 1_000.0),
        1 => "1 byte".to_string(),
        0 => String::new(),
        b => format!("{b} bytes"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn episode_number_comes_from_the_title() {
        assert_eq!(episode_number("[Group] Show - S01E07 [1080p].mkv"), Some(7.0));
        assert_eq!(episode_number("Show - 12.mkv"), Some(12.0));
        assert_eq!(episode_number("Show Special.mkv"), None);
        assert_eq!(episode_number("Show-03.mkv"), None);
    }

    #[test]
    fn strips_group_quality_and_extension() {
        assert_eq!(trim_info("[Group] Show - 01 [1080p].mkv"), "Show - 01");
        assert_eq!(trim_info("Show - 01.mkv"), "Show - 01");
        assert_eq!(
            trim_info("[Sub-Group] Show - 12 (BD 1080p) [HEVC] [ABCD1234].mp4"),
            "Show - 12"
        );
    }

    #[test]
    fn keeps_mid_title_brackets() {
        assert_eq!(trim_info("Show [Director's Cut] Part 2.mkv"), "Show [Director's Cut] Part 2");
        assert_eq!(trim_info("Movie (Remastered) Extra.avi"), "Movie (Remastered) Extra");
    }

    #[test]
    fn idempotent_on_awkward_inputs() {
        let samples = [
            "",
            "   ",
            "[A] [B] Title",
            "[A]Title.mkv.mkv",
            "Title (x).mkv (y)",
            "  [Grp] Ep 03 [720p] .MKV ",
            "[Group] Show - 01 [1080p].mkv",
            "(x)",
            "[only]",
            "Ünïcode [Grüppe] Título (Fan Sub).mp4",
        ];
        for sample in samples {
            let once = trim_info(sample);
            assert_eq!(trim_info(&once), once, "input={sample:?}");
        }
    }

    #[test]
    fn size_labels_match_decimal_units() {
        assert_eq!(format_file_size(2_000_000_000), "2.00 GB");
        assert_eq!(format_file_size(1_536_000), "1.54 MB");
        assert_eq!(format_file_size(1_000), "1.00 KB");
        assert_eq!(format_file_size(999), "999 bytes");
        assert_eq!(format_file_size(1), "1 byte");
        assert_eq!(format_file_size(0), "");
    }
}
