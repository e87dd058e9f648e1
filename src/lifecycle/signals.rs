//! Termination signal sources.

use std::io;

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationSignal {
    Interrupt,
    Terminate,
}

impl TerminationSignal {
    pub const ALL: [TerminationSignal; 2] = [Self::Interrupt, Self::Terminate];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
        }
    }
}

/// A stream of deliveries for one signal. `None` means the source is closed.
#[async_trait]
pub trait SignalStream: Send {
    async fn recv(&mut self) -> Option<()>;
}

pub trait SignalSource: Send + Sync {
    fn listen(&self, signal: TerminationSignal) -> io::Result<Box<dyn SignalStream>>;
}

/// Operating-system signals through `tokio::signal`. Must be used inside a
/// tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSignals;

#[cfg(unix)]
mod os {
    use super::*;
    use tokio::signal::unix::{signal, Signal, SignalKind};

    struct UnixSignal(Signal);

    #[async_trait]
    impl SignalStream for UnixSignal {
        async fn recv(&mut self) -> Option<()> {
            self.0.recv().await
        }
    }

    impl SignalSource for OsSignals {
        fn listen(&self, which: TerminationSignal) -> io::Result<Box<dyn SignalStream>> {
            let kind = match which {
                TerminationSignal::Interrupt => SignalKind::interrupt(),
                TerminationSignal::Terminate => SignalKind::terminate(),
            };
            Ok(Box::new(UnixSignal(signal(kind)?)))
        }
    }
}

#[cfg(windows)]
mod os {
    use super::*;
    use tokio::signal::windows::{ctrl_c, ctrl_close, CtrlC, CtrlClose};

    // Windows에는 SIGTERM이 없어서 콘솔 닫기 이벤트로 대체
    enum WindowsSignal {
        CtrlC(CtrlC),
        CtrlClose(CtrlClose),
    }

    #[async_trait]
    impl SignalStream for WindowsSignal {
        async fn recv(&mut self) -> Option<()> {
            match self {
                Self::CtrlC(s) => s.recv().await,
                Self::CtrlClose(s) => s.recv().await,
            }
        }
    }

    impl SignalSource for OsSignals {
        fn listen(&self, which: TerminationSignal) -> io::Result<Box<dyn SignalStream>> {
            Ok(Box::new(match which {
                TerminationSignal::Interrupt => WindowsSignal::CtrlC(ctrl_c()?),
                TerminationSignal::Terminate => WindowsSignal::CtrlClose(ctrl_close()?),
            }))
        }
    }
}
