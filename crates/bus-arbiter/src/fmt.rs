//! Logging shims.
//!
//! Forward to `defmt` on targets and to `tracing` on hosts, whichever is
//! enabled. Arguments are always borrowed so that disabling both features
//! does not leave unused bindings behind.
#![allow(unused_macros)]

macro_rules! trace {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "defmt")]
        ::defmt::trace!($s $(, $x)*);
        #[cfg(feature = "tracing")]
        ::tracing::trace!($s $(, $x)*);
        $(let _ = &$x;)*
    }};
}

macro_rules! debug {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "defmt")]
        ::defmt::debug!($s $(, $x)*);
        #[cfg(feature = "tracing")]
        ::tracing::debug!($s $(, $x)*);
        $(let _ = &$x;)*
    }};
}
