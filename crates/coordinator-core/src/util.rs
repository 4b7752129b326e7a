//! Small helpers shared by the config model and loader.

/// Translate an arbitrary builder name into a filesystem-safe build directory
/// name: ASCII alphanumerics and `.`, `-`, `_` pass through unchanged,
/// everything else (including non-ASCII) becomes `_`.
///
/// This is the default `builddir` a [`crate::model::BuilderSpec`] gets when the
/// artifact doesn't set one explicitly.
pub fn safe_translate(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_through_safe_characters() {
        assert_eq!(safe_translate("build-1.2_release"), "build-1.2_release");
    }

    #[test]
    fn replaces_unsafe_characters() {
        assert_eq!(safe_translate("linux/x86 (64 bit)"), "linux_x86__64_bit_");
    }
}
