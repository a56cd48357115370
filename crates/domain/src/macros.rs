//! Display/FromStr boilerplate for the string-tagged enums persisted in the
//! sync ledger and audit log.
//!
//! # Example
//!
//! ```rust
//! use clinisync_domain::impl_tagged_enum_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Channel {
//!     Scheduled,
//!     OnDemand,
//! }
//!
//! impl_tagged_enum_conversions!(Channel {
//!     Scheduled => "scheduled",
//!     OnDemand => "on_demand",
//! });
//!
//! assert_eq!(Channel::OnDemand.to_string(), "on_demand");
//! assert_eq!("SCHEDULED".parse::<Channel>(), Ok(Channel::Scheduled));
//! ```

/// Implements `Display`, `FromStr` and an `as_str` accessor for a fieldless
/// enum.
///
/// Parsing is case-insensitive; rendering always uses the given tag.
#[macro_export]
macro_rules! impl_tagged_enum_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl $enum_name {
            /// Stable storage tag for this variant.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $str,)+
                }
            }
        }

        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
