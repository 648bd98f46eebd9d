use once_cell::sync::Lazy;
use rand::{thread_rng, Rng};
use regex::Regex;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::iter::repeat_with;

const CODE_LENGTH: usize = 6;

pub fn code_regex() -> String {
    format!(r"[0-9]{{{CODE_LENGTH}}}")
}

fn code_regex_anchored() -> String {
    format!(r"^{}$", code_regex())
}

/// One-time passcode sent by email for password resets.
#[derive(Clone, Debug, Deserialize)]
#[serde(try_from = "String")]
pub struct OtpCode(Secret<String>);

impl OtpCode {
    pub fn generate() -> Self {
        Self::generate_with_rng(&mut thread_rng())
    }

    fn generate_with_rng(rng: &mut impl Rng) -> Self {
        let code = repeat_with(|| char::from(b'0' + rng.gen_range(0..10u8)))
            .take(CODE_LENGTH)
            .collect();

        Self(Secret::new(code))
    }

    pub fn parse(s: String) -> Result<Self, String> {
        static RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(&code_regex_anchored()).ok());

        match RE.as_ref() {
            Some(re) if re.is_match(s.trim()) => Ok(Self(Secret::new(s.trim().to_string()))),
            _ => Err("Code must be 6 digits".into()),
        }
    }

    /// Timing-independent comparison against a stored code.
    pub fn matches(&self, stored: &str) -> bool {
        let given = self.0.expose_secret().as_bytes();
        let stored = stored.as_bytes();
        given.len() == stored.len()
            && given
                .iter()
                .zip(stored)
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }
}

impl ExposeSecret<String> for OtpCode {
    fn expose_secret(&self) -> &String {
        self.0.expose_secret()
    }
}

impl TryFrom<String> for OtpCode {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}
