//! Request field checks shared by the route handlers. Each helper pushes a
//! [`FieldError`] instead of failing fast so a response lists every problem.

use utils::response::FieldError;

#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, field: &str, message: impl Into<String>) -> &mut Self {
        self.errors.push(FieldError::new(field, message));
        self
    }

    /// Non-blank, at most `max` characters.
    pub fn required(&mut self, field: &str, value: &str, max: usize) -> &mut Self {
        if value.trim().is_empty() {
            self.error(field, "is required");
        } else {
            self.max_chars(field, value, max);
        }
        self
    }

    pub fn max_chars(&mut self, field: &str, value: &str, max: usize) -> &mut Self {
        if value.chars().count() > max {
            self.error(field, format!("must be at most {max} characters"));
        }
        self
    }

    pub fn slug(&mut self, field: &str, value: &str) -> &mut Self {
        let valid = value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
        if !value.is_empty() && !valid {
            self.error(
                field,
                "may only contain lowercase letters, digits, '-' and '_'",
            );
        }
        self
    }

    pub fn hex_color(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        if let Some(value) = value {
            let digits = value.strip_prefix('#').unwrap_or("");
            let valid = matches!(digits.len(), 3 | 6) && digits.chars().all(|c| c.is_ascii_hexdigit());
            if !valid {
                self.error(field, "must be a hex color such as #1a2b3c");
            }
        }
        self
    }

    pub fn http_url(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        if let Some(value) = value
            && !(value.starts_with("https://") || value.starts_with("http://"))
        {
            self.error(field, "must be an http(s) URL");
        }
        self
    }

    pub fn range<T: PartialOrd + std::fmt::Display>(
        &mut self,
        field: &str,
        value: Option<T>,
        min: T,
        max: T,
    ) -> &mut Self {
        if let Some(value) = value
            && (value < min || value > max)
        {
            self.error(field, format!("must be between {min} and {max}"));
        }
        self
    }

    pub fn finish(&mut self) -> Vec<FieldError> {
        std::mem::take(&mut self.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_every_failure() {
        let errors = Validator::new()
            .required("client_id", " ", 64)
            .required("display_name", &"x".repeat(130), 120)
            .hex_color("brand_color", Some("#12345"))
            .http_url("logo_url", Some("ftp://logo"))
            .range("max_tokens", Some(0u32), 1, 4096)
            .finish();

        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["client_id", "display_name", "brand_color", "logo_url", "max_tokens"]
        );
    }

    #[test]
    fn accepts_valid_values() {
        let errors = Validator::new()
            .required("client_id", "acme-co", 64)
            .slug("client_id", "acme-co")
            .hex_color("brand_color", Some("#A1b2C3"))
            .hex_color("brand_color", Some("#fff"))
            .http_url("logo_url", None)
            .range("duration", Some(5u8), 5, 10)
            .finish();
        assert!(errors.is_empty());
    }

    #[test]
    fn slug_rejects_uppercase_and_spaces() {
        assert_eq!(Validator::new().slug("client_id", "Acme Co").finish().len(), 1);
    }
}
