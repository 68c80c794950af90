pub mod args;
pub mod progress;
pub use progress::Progress;
pub mod counters;
pub use counters::{Counter, PassCounter};

use rastercalc::CalcError;

/// Exit status for a failed run: 2 when the inputs or
/// parameters are unusable, 1 otherwise.
pub fn exit_code(err: &rastercalc::Error) -> i32 {
    match err.downcast_ref::<CalcError>() {
        Some(CalcError::Config(_))
        | Some(CalcError::Mismatch { .. })
        | Some(CalcError::UnknownFormat(_)) => 2,
        _ => 1,
    }
}

#[inline]
pub fn unwrap_or_exit<T>(res: rastercalc::Result<T>) -> T {
    match res {
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(exit_code(&e))
        }
        Ok(t) => t,
    }
}

#[macro_export]
macro_rules! sync_main {
    ($name:expr) => {
        fn main() {
            $crate::cli::unwrap_or_exit({ $name });
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn exit_codes() {
        let config: rastercalc::Error = CalcError::config("window size 4").into();
        assert_eq!(exit_code(&config), 2);
        let io: rastercalc::Error = CalcError::io("opening x.tif").into();
        assert_eq!(exit_code(&io), 1);
        assert_eq!(exit_code(&anyhow!("other")), 1);
    }
}
