pub const CLEAN_EXIT_CODE: i32 = 0;
pub const STARTUP_FAILURE_EXIT_CODE: i32 = 1;

/// Process termination seam.
pub trait ProcessExit: Send + Sync {
    fn exit(&self, code: i32);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExit;

impl ProcessExit for SystemExit {
    fn exit(&self, code: i32) {
        tracing::info!("Exiting with code {}", code);
        std::process::exit(code)
    }
}
