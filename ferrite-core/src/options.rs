#![forbid(unsafe_code)]

use std::str::FromStr;

use serde::Deserialize;

/// Knobs for behavior where the source and target runtimes disagree.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TranslateOptions {
    pub async_fallback: AsyncFallback,
    pub text_length: TextLength,
    pub rounding: Rounding,
}

/// What to do when a synchronous function calls an asynchronous one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AsyncFallback {
    /// Report `UnsupportedConstruct`.
    #[default]
    Reject,
    /// Wrap the call in `futures::executor::block_on`.
    BlockOn,
}

/// Unit counted by `text.length`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextLength {
    /// UTF-16 code units, as the source runtime counts.
    #[default]
    Utf16,
    Chars,
    Bytes,
}

/// Rounding of half-way values by `Math.round`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rounding {
    /// Toward positive infinity (`Math.round(-2.5) == -2`).
    #[default]
    HalfUp,
    /// `f64::round` (`-2.5` → `-3`).
    HalfAwayFromZero,
}

macro_rules! kebab_from_str {
    ($ty:ty, $($text:literal => $variant:expr),+ $(,)?) => {
        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($variant),)+
                    other => Err(format!(
                        "unknown value `{other}` (expected one of: {})",
                        [$($text),+].join(", ")
                    )),
                }
            }
        }
    };
}

kebab_from_str!(
    AsyncFallback,
    "reject" => AsyncFallback::Reject,
    "block-on" => AsyncFallback::BlockOn,
);
kebab_from_str!(
    TextLength,
    "utf16" => TextLength::Utf16,
    "chars" => TextLength::Chars,
    "bytes" => TextLength::Bytes,
);
kebab_from_str!(
    Rounding,
    "half-up" => Rounding::HalfUp,
    "half-away-from-zero" => Rounding::HalfAwayFromZero,
);
