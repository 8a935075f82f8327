//! Signal Workbench Module SDK
//! ===========================
//!
//! Everything a processing module needs to plug into the Signal Workbench
//! host. A module is a `cdylib` that implements [`ProcessingModule`] and
//! exports it with [`declare_sigbench_module!`]. The host resolves the two
//! exported symbols ([`ABI_VERSION_SYMBOL`] and [`ENTRY_SYMBOL`]), calls the
//! entry point once per load and then drives [`ProcessingModule::run`]
//! whenever the user commits a new parameter combination.
//!
//! Modules are linked against the host through the Rust ABI, so they must be
//! built with the same toolchain and the same SDK version as the host.

mod figure;
mod module;
mod playback;

use std::any::Any;

pub use figure::{Figure, Panel, Series};
pub use module::{
    export_guarded, invoke_guarded, EntryPoint, Invocation, InvokeFn, ModuleExport,
    ProcessingModule,
};
pub use playback::{PlaybackEvent, PlaybackHandle};

/// Version of the host/module contract. Bumped whenever [`ModuleExport`],
/// [`Figure`] or [`PlaybackHandle`] change shape.
pub const ABI_VERSION: u32 = 2;

/// Exported `u32` static holding the module's [`ABI_VERSION`].
pub const ABI_VERSION_SYMBOL: &str = "sigbench_module_abi_version";

/// Exported `extern "C" fn() -> Result<ModuleExport, String>`.
pub const ENTRY_SYMBOL: &str = "sigbench_module_entry";

/// Inclusive range of both tunable parameters.
pub const PARAM_MIN: u8 = 0;
pub const PARAM_MAX: u8 = 100;

/// Common imports for module authors.
pub mod prelude {
    pub use crate::{
        declare_sigbench_module, Figure, Panel, PlaybackHandle, ProcessingModule, Series,
        PARAM_MAX, PARAM_MIN,
    };
}

/// Render a panic payload as text.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Declare the entry point of a dynamic Signal Workbench module.
///
/// The macro expects an expression evaluating to a type implementing
/// [`ProcessingModule`]. It exports the ABI version static and the entry
/// function the host looks up when loading the library. The expression is
/// evaluated on every load; if it panics, the host gets an error instead.
///
/// # Example
///
/// ```ignore
/// use sigbench_module_sdk::prelude::*;
///
/// struct Flat;
///
/// impl ProcessingModule for Flat { /* ... */ }
///
/// declare_sigbench_module!(Flat);
/// ```
#[macro_export]
macro_rules! declare_sigbench_module {
    ($module:expr) => {
        #[no_mangle]
        #[allow(non_upper_case_globals)]
        pub static sigbench_module_abi_version: u32 = $crate::ABI_VERSION;

        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn sigbench_module_entry(
        ) -> ::std::result::Result<$crate::ModuleExport, ::std::string::String> {
            $crate::export_guarded(|| $module)
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    mod faulty {
        use crate::prelude::*;

        pub struct Faulty;

        impl Faulty {
            fn new() -> Self {
                panic!("calibration table missing")
            }
        }

        impl ProcessingModule for Faulty {
            fn run(
                &self,
                _param1: u8,
                _param2: u8,
                _target: &mut Figure,
                _data_file: &str,
                _playback: Option<&PlaybackHandle>,
            ) -> anyhow::Result<()> {
                Ok(())
            }
        }

        declare_sigbench_module!(Faulty::new());
    }

    #[test]
    fn entry_point_reports_panicking_constructor() {
        assert_eq!(faulty::sigbench_module_abi_version, ABI_VERSION);
        let err = faulty::sigbench_module_entry().err().unwrap();
        assert_eq!(err, "module constructor panicked: calibration table missing");
    }

    #[test]
    fn panic_message_handles_common_payloads() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(payload.as_ref()), "owned boom");
        let payload: Box<dyn Any + Send> = Box::new(42_u32);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}
