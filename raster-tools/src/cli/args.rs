//! Argument helpers shared by the binaries, on top of the
//! clap 2 builder.

pub use clap::{App, Arg, ArgMatches};
pub use inflector::Inflector;

use std::str::FromStr;

/// App with the crate version and authors filled in.
#[macro_export]
macro_rules! args_parser {
    ($name:expr) => {{
        $crate::cli::args::App::new($name)
            .version(clap::crate_version!())
            .author(clap::crate_authors!())
    }};
}

/// Positional argument; the value name is the argument
/// name in screaming snake case.
#[macro_export]
macro_rules! arg {
    ($name:expr) => {{
        use $crate::cli::args::Inflector;
        $crate::cli::args::Arg::with_name($name).value_name(&$name.to_screaming_snake_case())
    }};
}

/// Option taking a value, spelt `--kebab-case`.
#[macro_export]
macro_rules! opt {
    ($name:expr) => {{
        use $crate::cli::args::Inflector;
        $crate::cli::args::Arg::with_name($name)
            .long(&$name.to_kebab_case())
            .takes_value(true)
            .value_name(&$name.to_screaming_snake_case())
    }};
}

/// Value of an optional argument, `None` when absent.
/// Exits with clap's usage error if it does not parse.
pub fn optional<T: FromStr>(matches: &ArgMatches, name: &str) -> Option<T> {
    matches.value_of(name).map(|v| {
        v.parse().unwrap_or_else(|_| {
            clap::Error::value_validation_auto(format!("invalid value {:?} for {}", v, name)).exit()
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{arg, opt};

    #[test]
    fn options_are_kebab_case() {
        let m = App::new("test")
            .arg(arg!("input").required(true))
            .arg(opt!("window size").short("w"))
            .get_matches_from(vec!["test", "in.tif", "--window-size", "5"]);
        assert_eq!(m.value_of("input"), Some("in.tif"));
        assert_eq!(optional::<i64>(&m, "window size"), Some(5));

        let m = App::new("test")
            .arg(arg!("input").required(true))
            .arg(opt!("window size").short("w"))
            .get_matches_from(vec!["test", "in.tif"]);
        assert_eq!(optional::<i64>(&m, "window size"), None);
    }
}
