/// Logs the first message at `debug` level, or the second, more detailed one
/// at `trace` level when tracing is enabled.
#[macro_export]
macro_rules! debug_or_trace {
    (($($debug:tt)+), ($($trace:tt)+)) => {
        if $crate::log::log_enabled!($crate::log::Level::Trace) {
            $crate::log::trace!($($trace)*);
        } else {
            $crate::log::debug!($($debug)*);
        }
    }
}

#[cfg(test)]
mod tests {
    #[test_log::test]
    fn debug_or_trace_accepts_format_arguments() {
        let statement = "select";
        let rows = 3;

        debug_or_trace!(
            ("{statement}: {rows} row(s)"),
            ("{statement}: {rows} row(s) from users")
        );
    }
}
