/// Normalizes free-form strings reported by clients
#[derive(Debug, Default, Clone, Copy)]
pub struct Enricher;

/// Prefix removed from device model labels, compared case-insensitively
const SAMSUNG_PREFIX: &str = "samsung ";

impl Enricher {
    pub fn new() -> Self {
        Self
    }

    /// Map engine and OS platform names onto canonical labels
    ///
    /// Input is trimmed and lowercased first. Names without a known alias are
    /// returned in that trimmed, lowercased form.
    pub fn normalize_platform(&self, platform: &str) -> String {
        let platform = platform.trim().to_lowercase();
        let canonical = match platform.as_str() {
            "android" | "androidplayer" => "Android",
            "ios" | "iphone" | "iphoneplayer" => "iOS",
            "windows" | "windowsplayer" | "windowseditor" => "Windows",
            "osx" | "osxplayer" | "osxeditor" | "macos" => "macOS",
            "linux" | "linuxplayer" | "linuxeditor" => "Linux",
            "webgl" => "WebGL",
            _ => return platform,
        };
        canonical.to_string()
    }

    /// Clean up a device model label
    ///
    /// Blank input becomes `"Unknown"`. A leading `"Samsung "` is dropped and
    /// the rest keeps its original casing.
    pub fn normalize_device_model(&self, model: &str) -> String {
        let model = model.trim();
        if model.is_empty() {
            return "Unknown".to_string();
        }

        match model.get(..SAMSUNG_PREFIX.len()) {
            Some(prefix) if prefix.eq_ignore_ascii_case(SAMSUNG_PREFIX) => {
                model[SAMSUNG_PREFIX.len()..].to_string()
            }
            _ => model.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_aliases() {
        let enricher = Enricher::new();
        let cases = [
            ("android", "Android"),
            ("AndroidPlayer", "Android"),
            ("ios", "iOS"),
            ("IPhonePlayer", "iOS"),
            ("iphone", "iOS"),
            ("WindowsPlayer", "Windows"),
            ("windowseditor", "Windows"),
            ("OSXPlayer", "macOS"),
            ("macos", "macOS"),
            ("osxeditor", "macOS"),
            ("LinuxPlayer", "Linux"),
            ("linuxeditor", "Linux"),
            ("WebGL", "WebGL"),
        ];
        for (input, expected) in cases {
            assert_eq!(enricher.normalize_platform(input), expected, "input {input}");
        }
    }

    #[test]
    fn test_platform_case_insensitive_and_trimmed() {
        let enricher = Enricher::new();
        assert_eq!(enricher.normalize_platform("ANDROID"), "Android");
        assert_eq!(enricher.normalize_platform("android"), "Android");
        assert_eq!(enricher.normalize_platform("  iOS \n"), "iOS");
    }

    #[test]
    fn test_unknown_platform_is_lowercased() {
        let enricher = Enricher::new();
        assert_eq!(enricher.normalize_platform("  PS5 "), "ps5");
        assert_eq!(enricher.normalize_platform("Switch"), "switch");
        assert_eq!(enricher.normalize_platform(""), "");
    }

    #[test]
    fn test_device_model_blank_is_unknown() {
        let enricher = Enricher::new();
        assert_eq!(enricher.normalize_device_model(""), "Unknown");
        assert_eq!(enricher.normalize_device_model("   \t"), "Unknown");
    }

    #[test]
    fn test_device_model_samsung_prefix() {
        let enricher = Enricher::new();
        assert_eq!(
            enricher.normalize_device_model("Samsung Galaxy S21"),
            "Galaxy S21"
        );
        assert_eq!(enricher.normalize_device_model("SAMSUNG SM-G998B"), "SM-G998B");
        assert_eq!(enricher.normalize_device_model("  samsung tab s8 "), "tab s8");
    }

    #[test]
    fn test_device_model_passthrough() {
        let enricher = Enricher::new();
        assert_eq!(enricher.normalize_device_model(" Pixel 8 Pro "), "Pixel 8 Pro");
        // No space after the brand, so nothing is stripped
        assert_eq!(enricher.normalize_device_model("SamsungGalaxy"), "SamsungGalaxy");
        assert_eq!(enricher.normalize_device_model("iPhone15,2"), "iPhone15,2");
    }

    #[test]
    fn test_device_model_multibyte_input() {
        let enricher = Enricher::new();
        assert_eq!(enricher.normalize_device_model("小米 13"), "小米 13");
        assert_eq!(enricher.normalize_device_model("Samsung Ü"), "Ü");
    }
}
