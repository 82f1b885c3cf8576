//! Diagnostics emitted by the propagator itself.
//!
//! With the `internal-logs` feature these macros emit `tracing` events named
//! after the operation and targeted at this crate. Under `cfg(test)` they
//! print to stdout, and otherwise they compile to nothing.

macro_rules! cloud_trace_debug {
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            tracing::debug!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name, $($key = $value),+);
        }

        #[cfg(test)]
        {
            print!("cloud_trace_debug: name={}", $name);
            $(
                print!(", {}={}", stringify!($key), $value);
            )+
            println!();
        }

        #[cfg(all(not(feature = "internal-logs"), not(test)))]
        {
            let _ = ($name, $($value),+);
        }
    };
}

macro_rules! cloud_trace_warn {
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            tracing::warn!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name, $($key = $value),+);
        }

        #[cfg(test)]
        {
            print!("cloud_trace_warn: name={}", $name);
            $(
                print!(", {}={}", stringify!($key), $value);
            )+
            println!();
        }

        #[cfg(all(not(feature = "internal-logs"), not(test)))]
        {
            let _ = ($name, $($value),+);
        }
    };
}
