use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{FaxinaError, Result};
use crate::model::{OrganizeEvent, OrganizeReport, ScanReport};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    Idle,
    Scanning,
    Ready,
    Moving,
    Done,
    Error,
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StateKind::Idle => "idle",
            StateKind::Scanning => "scanning",
            StateKind::Ready => "ready",
            StateKind::Moving => "moving",
            StateKind::Done => "done",
            StateKind::Error => "error",
        };
        f.write_str(label)
    }
}

/// What a front end shows for one selected directory. Each variant carries
/// exactly the data that is meaningful in it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OrganizerState {
    #[default]
    Idle,
    Scanning {
        root: PathBuf,
    },
    Ready {
        scan: Box<ScanReport>,
    },
    Moving {
        scan: Box<ScanReport>,
        run_id: Option<String>,
        processed: u64,
        total: u64,
        percent: f64,
        status: String,
    },
    /// `rescan` is the directory as it looks after the run; a `Done` state
    /// with a rescan can be executed again like `Ready`.
    Done {
        report: Box<OrganizeReport>,
        rescan: Option<Box<ScanReport>>,
    },
    Error {
        message: String,
        blocking: bool,
        last_scan: Option<Box<ScanReport>>,
    },
}

impl OrganizerState {
    pub fn kind(&self) -> StateKind {
        match self {
            OrganizerState::Idle => StateKind::Idle,
            OrganizerState::Scanning { .. } => StateKind::Scanning,
            OrganizerState::Ready { .. } => StateKind::Ready,
            OrganizerState::Moving { .. } => StateKind::Moving,
            OrganizerState::Done { .. } => StateKind::Done,
            OrganizerState::Error { .. } => StateKind::Error,
        }
    }

    /// The file listing a front end should currently display, if any.
    pub fn scan(&self) -> Option<&ScanReport> {
        match self {
            OrganizerState::Ready { scan } | OrganizerState::Moving { scan, .. } => Some(&**scan),
            OrganizerState::Done { rescan, .. } => rescan.as_deref(),
            OrganizerState::Error { last_scan, .. } => last_scan.as_deref(),
            OrganizerState::Idle | OrganizerState::Scanning { .. } => None,
        }
    }

    pub fn progress(&self) -> f64 {
        match self {
            OrganizerState::Moving { percent, .. } => *percent,
            OrganizerState::Done { .. } => 100.0,
            _ => 0.0,
        }
    }

    pub fn status_message(&self) -> String {
        match self {
            OrganizerState::Idle => String::new(),
            OrganizerState::Scanning { root } => format!("reading files in {}", root.display()),
            OrganizerState::Ready { scan } => format!(
                "{} file(s) ready in {} categor(ies)",
                scan.total_files(),
                scan.categories.len()
            ),
            OrganizerState::Moving { status, .. } => status.clone(),
            OrganizerState::Done { report, .. } => {
                if report.failures.is_empty() {
                    format!("cleanup finished: {} file(s) moved", report.moved.len())
                } else {
                    format!(
                        "cleanup finished: {} file(s) moved, {} left in place",
                        report.moved.len(),
                        report.failures.len()
                    )
                }
            }
            OrganizerState::Error { message, .. } => message.clone(),
        }
    }

    pub fn begin_scan(&mut self, root: PathBuf) -> Result<()> {
        match self.kind() {
            StateKind::Scanning | StateKind::Moving => Err(self.rejected(StateKind::Scanning)),
            _ => {
                *self = OrganizerState::Scanning { root };
                Ok(())
            }
        }
    }

    /// A failed scan discards any previous listing.
    pub fn finish_scan(&mut self, result: Result<ScanReport>) -> Result<()> {
        if self.kind() != StateKind::Scanning {
            return Err(self.rejected(StateKind::Ready));
        }
        *self = match result {
            Ok(scan) => OrganizerState::Ready {
                scan: Box::new(scan),
            },
            Err(err) => OrganizerState::Error {
                message: err.to_string(),
                blocking: err.is_blocking(),
                last_scan: None,
            },
        };
        Ok(())
    }

    /// Moves into `Moving` and hands back the scan whose mapping should be
    /// executed.
    pub fn begin_move(&mut self) -> Result<ScanReport> {
        let scan = match self {
            OrganizerState::Ready { scan } => (**scan).clone(),
            OrganizerState::Done {
                rescan: Some(rescan),
                ..
            } => (**rescan).clone(),
            OrganizerState::Error {
                last_scan: Some(scan),
                ..
            } => (**scan).clone(),
            _ => return Err(self.rejected(StateKind::Moving)),
        };
        let total = scan.total_files() as u64;
        *self = OrganizerState::Moving {
            scan: Box::new(scan.clone()),
            run_id: None,
            processed: 0,
            total,
            percent: 0.0,
            status: "starting".to_string(),
        };
        Ok(scan)
    }

    pub fn record_progress(&mut self, event: &OrganizeEvent) -> Result<()> {
        match self {
            OrganizerState::Moving {
                run_id,
                processed,
                total,
                percent,
                status,
                ..
            } => {
                *run_id = Some(event.run_id.clone());
                *processed = event.processed;
                *total = event.total;
                // Progress never moves backwards.
                *percent = percent.max(event.percent);
                *status = event.message.clone();
                Ok(())
            }
            _ => Err(self.rejected(StateKind::Moving)),
        }
    }

    /// A run that could not start keeps the scan it was started from, so the
    /// whole operation can be retried.
    pub fn finish_move(&mut self, result: Result<OrganizeReport>) -> Result<()> {
        let scan = match self {
            OrganizerState::Moving { scan, .. } => scan.clone(),
            _ => return Err(self.rejected(StateKind::Done)),
        };
        *self = match result {
            Ok(mut report) => {
                let rescan = report.rescan.take().map(Box::new);
                OrganizerState::Done {
                    report: Box::new(report),
                    rescan,
                }
            }
            Err(err) => OrganizerState::Error {
                message: err.to_string(),
                blocking: err.is_blocking(),
                last_scan: Some(scan),
            },
        };
        Ok(())
    }

    fn rejected(&self, to: StateKind) -> FaxinaError {
        FaxinaError::InvalidTransition {
            from: self.kind().to_string(),
            to: to.to_string(),
        }
    }
}
