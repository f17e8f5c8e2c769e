mod money;

pub mod op;

mod helpers;
mod secret;

pub use helpers::parse_boolean_flag;
pub use money::{MinorUnits, MoneyConversionError, DEFAULT_CURRENCY, DEFAULT_CURRENCY_LOWER};
pub use secret::Secret;
