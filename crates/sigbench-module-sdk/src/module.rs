use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::{panic_message, Figure, PlaybackHandle};

/// The entry-point contract every processing module implements.
///
/// `run` receives both parameter values (each within
/// [`PARAM_MIN`](crate::PARAM_MIN)..=[`PARAM_MAX`](crate::PARAM_MAX)), the
/// render target, the selected data file and an optional playback handle.
/// It must repaint `target` completely before returning. From the host's
/// perspective every call is stateless.
pub trait ProcessingModule: Send {
    fn run(
        &self,
        param1: u8,
        param2: u8,
        target: &mut Figure,
        data_file: &str,
        playback: Option<&PlaybackHandle>,
    ) -> anyhow::Result<()>;
}

/// Arguments of one invocation, minus the render target.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub param1: u8,
    pub param2: u8,
    pub data_file: &'a str,
    pub playback: Option<&'a PlaybackHandle>,
}

pub type InvokeFn = fn(&dyn ProcessingModule, &Invocation<'_>, &mut Figure) -> Result<(), String>;

/// Signature of the exported entry symbol. A constructor that panics comes
/// back as `Err` with the panic message.
#[allow(improper_ctypes_definitions)]
pub type EntryPoint = unsafe extern "C" fn() -> Result<ModuleExport, String>;

/// Value returned by a module's entry point.
///
/// Besides the module itself it carries the dispatch function compiled into
/// the module's own binary, so that panics are caught by the same runtime
/// that raised them.
pub struct ModuleExport {
    module: Box<dyn ProcessingModule>,
    invoke: InvokeFn,
}

impl ModuleExport {
    pub fn new(module: Box<dyn ProcessingModule>) -> Self {
        Self {
            module,
            invoke: invoke_guarded,
        }
    }

    /// Run the module. Errors and panics come back as diagnostic text.
    pub fn invoke(&self, invocation: &Invocation<'_>, target: &mut Figure) -> Result<(), String> {
        (self.invoke)(self.module.as_ref(), invocation, target)
    }
}

/// Construct a module for export without letting a panic escape.
///
/// Used by [`declare_sigbench_module!`](crate::declare_sigbench_module): the
/// entry point is `extern "C"`, so a panic unwinding out of it would abort
/// the host.
pub fn export_guarded<M, F>(construct: F) -> Result<ModuleExport, String>
where
    M: ProcessingModule + 'static,
    F: FnOnce() -> M,
{
    catch_unwind(AssertUnwindSafe(|| ModuleExport::new(Box::new(construct())))).map_err(
        |payload| {
            format!(
                "module constructor panicked: {}",
                panic_message(payload.as_ref())
            )
        },
    )
}

/// Call [`ProcessingModule::run`], folding errors and panics into a message.
///
/// Errors are rendered with their full cause chain.
pub fn invoke_guarded(
    module: &dyn ProcessingModule,
    invocation: &Invocation<'_>,
    target: &mut Figure,
) -> Result<(), String> {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        module.run(
            invocation.param1,
            invocation.param2,
            target,
            invocation.data_file,
            invocation.playback,
        )
    }));
    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(format!("{err:#}")),
        Err(payload) => Err(format!("module panicked: {}", panic_message(payload.as_ref()))),
    }
}

#[cfg(test)]
mod tests {
    use anyhow::{anyhow, Context};

    use super::*;

    struct Scripted;

    impl ProcessingModule for Scripted {
        fn run(
            &self,
            param1: u8,
            param2: u8,
            target: &mut Figure,
            data_file: &str,
            _playback: Option<&PlaybackHandle>,
        ) -> anyhow::Result<()> {
            match param1 {
                0 => {
                    target.clear();
                    target.set_title(format!("{data_file} {param2}"));
                    Ok(())
                }
                1 => Err(anyhow!("disk on fire")).context("reading input"),
                _ => panic!("param1 out of script"),
            }
        }
    }

    fn invocation(param1: u8) -> Invocation<'static> {
        Invocation {
            param1,
            param2: 7,
            data_file: "a.wav",
            playback: None,
        }
    }

    #[test]
    fn successful_run_repaints_target() {
        let export = ModuleExport::new(Box::new(Scripted));
        let mut figure = Figure::new();
        export.invoke(&invocation(0), &mut figure).unwrap();
        assert_eq!(figure.title(), Some("a.wav 7"));
    }

    #[test]
    fn errors_keep_their_cause_chain() {
        let export = ModuleExport::new(Box::new(Scripted));
        let detail = export.invoke(&invocation(1), &mut Figure::new()).unwrap_err();
        assert!(detail.contains("reading input"));
        assert!(detail.contains("disk on fire"));
    }

    #[test]
    fn constructor_panics_become_errors() {
        let err = export_guarded(|| -> Scripted { panic!("no config file") })
            .err()
            .unwrap();
        assert_eq!(err, "module constructor panicked: no config file");
        assert!(export_guarded(|| Scripted).is_ok());
    }

    #[test]
    fn panics_are_contained() {
        let export = ModuleExport::new(Box::new(Scripted));
        let detail = export.invoke(&invocation(2), &mut Figure::new()).unwrap_err();
        assert_eq!(detail, "module panicked: param1 out of script");
    }
}
