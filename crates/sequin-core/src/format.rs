use jiff::Timestamp;
use std::fmt;
use std::sync::Arc;

/// Everything a formatter may use to render a sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatContext {
    pub namespace: String,
    pub prefix: String,
    pub suffix: Option<String>,
    pub sequence: i64,
    /// Minimum width of the padded sequence.
    pub length: usize,
    pub pad: char,
    pub separator: String,
    /// When the sequence was formatted.
    pub timestamp: Timestamp,
}

/// Left-pads `sequence` with `pad` up to `length` characters.
///
/// Values wider than `length` are returned whole.
pub fn pad_sequence(sequence: i64, length: usize, pad: char) -> String {
    let digits = sequence.to_string();
    let missing = length.saturating_sub(digits.chars().count());
    let mut padded = String::with_capacity(missing * pad.len_utf8() + digits.len());
    padded.extend(std::iter::repeat(pad).take(missing));
    padded.push_str(&digits);
    padded
}

/// `prefix`, padded sequence and `suffix` joined by `separator`, skipping
/// empty parts.
pub fn default_format(ctx: &FormatContext) -> String {
    let padded = pad_sequence(ctx.sequence, ctx.length, ctx.pad);
    let mut parts = Vec::with_capacity(3);
    if !ctx.prefix.is_empty() {
        parts.push(ctx.prefix.as_str());
    }
    parts.push(padded.as_str());
    if let Some(suffix) = ctx.suffix.as_deref().filter(|s| !s.is_empty()) {
        parts.push(suffix);
    }
    parts.join(&ctx.separator)
}

/// A function turning a [`FormatContext`] into the display string.
#[derive(Clone)]
pub struct Formatter(Arc<dyn Fn(&FormatContext) -> String + Send + Sync>);

impl Formatter {
    pub fn new(f: impl Fn(&FormatContext) -> String + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn format(&self, ctx: &FormatContext) -> String {
        (self.0)(ctx)
    }
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new(default_format)
    }
}

impl fmt::Debug for Formatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Formatter(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(prefix: &str, sequence: i64, suffix: Option<&str>) -> FormatContext {
        FormatContext {
            namespace: "ticket".to_string(),
            prefix: prefix.to_string(),
            suffix: suffix.map(str::to_string),
            sequence,
            length: 4,
            pad: '0',
            separator: String::new(),
            timestamp: Timestamp::UNIX_EPOCH,
        }
    }

    #[test]
    fn pads_to_length() {
        assert_eq!(default_format(&ctx("VIP", 1, None)), "VIP0001");
    }

    #[test]
    fn custom_pad_character_and_length() {
        let mut ctx = ctx("", 1, None);
        ctx.length = 10;
        ctx.pad = 'x';

        let value = default_format(&ctx);
        assert_eq!(value, "xxxxxxxxx1");
        assert_eq!(value.chars().count(), 10);
        assert!(!value.contains('0'));
    }

    #[test]
    fn wide_values_are_not_truncated() {
        assert_eq!(pad_sequence(123_456, 4, '0'), "123456");
    }

    #[test]
    fn separator_joins_present_parts_only() {
        let mut with_suffix = ctx("TZ", 7, Some("EU"));
        with_suffix.separator = "-".to_string();
        assert_eq!(default_format(&with_suffix), "TZ-0007-EU");

        let mut bare = ctx("", 7, Some(""));
        bare.separator = "-".to_string();
        assert_eq!(default_format(&bare), "0007");
    }

    #[test]
    fn custom_formatter_sees_the_context() {
        let formatter = Formatter::new(|ctx| format!("{}#{}", ctx.namespace, ctx.sequence));
        assert_eq!(formatter.format(&ctx("TZ", 12, None)), "ticket#12");
    }

    #[test]
    fn default_formatter_matches_default_format() {
        let ctx = ctx("TZ21", 1, None);
        assert_eq!(Formatter::default().format(&ctx), "TZ210001");
    }
}
