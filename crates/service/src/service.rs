use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;

use anyhow::{anyhow, Context, Result};
use faxina_core::{
    collect_doctor_info, resolve_with_config, run_organize_with_callback, run_scan,
    ClassifierConfig, DoctorInfo, OrganizeEvent, OrganizeOptions, OrganizeReport,
    OrganizerState, ScanOptions, ScanReport, StateKind,
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenDirectoryRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub root: PathBuf,
    #[serde(default)]
    pub excludes: Vec<String>,
    /// Ask the remote classifier for categories; falls back to extension
    /// rules when it is not configured or its answer is unusable.
    #[serde(default)]
    pub use_classifier: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_verify_writes")]
    pub verify_writes: bool,
    /// Where to write the JSON run report once an organization finishes.
    #[serde(default)]
    pub output: Option<PathBuf>,
}

fn default_verify_writes() -> bool {
    true
}

impl OpenDirectoryRequest {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            session_id: None,
            root: root.into(),
            excludes: Vec::new(),
            use_classifier: false,
            dry_run: false,
            verify_writes: default_verify_writes(),
            output: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub root: PathBuf,
    pub state: StateKind,
    pub progress: f64,
    pub status: String,
    pub total_files: u64,
    pub categories: BTreeMap<String, usize>,
    pub moved: u64,
    pub failed: u64,
    pub error: Option<String>,
    pub blocking: bool,
    pub total_events: u64,
    pub scan: Option<ScanReport>,
}

#[derive(Debug)]
struct Session {
    request: OpenDirectoryRequest,
    state: OrganizerState,
    events: Vec<OrganizeEvent>,
}

static SESSIONS: Lazy<Mutex<HashMap<String, Session>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Registers a session for `request.root` and scans it before returning.
/// A failed scan still yields a session id; its snapshot carries the error.
pub fn open_directory(request: OpenDirectoryRequest) -> Result<String> {
    let session_id = request
        .session_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    {
        let mut sessions = lock_sessions()?;
        if sessions.contains_key(&session_id) {
            return Err(anyhow!("session already exists: {session_id}"));
        }
        let mut state = OrganizerState::default();
        state.begin_scan(request.root.clone())?;
        sessions.insert(
            session_id.clone(),
            Session {
                request: request.clone(),
                state,
                events: Vec::new(),
            },
        );
    }

    let result = scan_directory(&request);
    with_session(&session_id, |session| {
        session.state.finish_scan(result)?;
        Ok(())
    })?;

    info!("opened session {} for {}", session_id, request.root.display());
    Ok(session_id)
}

/// Scans the session's directory again, replacing its listing.
pub fn rescan(session_id: &str) -> Result<SessionSnapshot> {
    let request = with_session(session_id, |session| {
        session.state.begin_scan(session.request.root.clone())?;
        Ok(session.request.clone())
    })?;

    let result = scan_directory(&request);
    with_session(session_id, |session| {
        session.state.finish_scan(result)?;
        Ok(())
    })?;
    get_session(session_id)
}

/// Starts moving the current listing on a background thread. Progress is
/// buffered in the session and read with [`poll_organize_events`].
pub fn start_organization(session_id: &str) -> Result<()> {
    let (scan, request) = with_session(session_id, |session| {
        let scan = session.state.begin_move()?;
        session.events.clear();
        Ok((scan, session.request.clone()))
    })?;

    let thread_session_id = session_id.to_string();
    thread::spawn(move || {
        let options = OrganizeOptions {
            dry_run: request.dry_run,
            verify_writes: request.verify_writes,
            excludes: request.excludes.clone(),
            ..OrganizeOptions::default()
        };

        let result = run_organize_with_callback(&request.root, &scan.categories, &options, |event| {
            if let Ok(mut sessions) = lock_sessions() {
                if let Some(session) = sessions.get_mut(&thread_session_id) {
                    if let Err(err) = session.state.record_progress(&event) {
                        warn!("dropping progress for {}: {}", thread_session_id, err);
                    }
                    session.events.push(event);
                }
            }
        });

        if let (Ok(report), Some(path)) = (&result, &request.output) {
            if let Err(err) = write_report(report, path) {
                warn!("{err:#}");
            }
        }

        if let Ok(mut sessions) = lock_sessions() {
            if let Some(session) = sessions.get_mut(&thread_session_id) {
                if let Err(err) = session.state.finish_move(result) {
                    warn!("session {} left its run early: {}", thread_session_id, err);
                }
            }
        }
    });

    Ok(())
}

pub fn poll_organize_events(session_id: &str, from_seq: u64) -> Result<Vec<OrganizeEvent>> {
    let sessions = lock_sessions()?;
    let session = sessions
        .get(session_id)
        .ok_or_else(|| anyhow!("session not found: {session_id}"))?;

    Ok(session
        .events
        .iter()
        .filter(|event| event.seq > from_seq)
        .cloned()
        .collect())
}

pub fn get_session(session_id: &str) -> Result<SessionSnapshot> {
    let sessions = lock_sessions()?;
    let session = sessions
        .get(session_id)
        .ok_or_else(|| anyhow!("session not found: {session_id}"))?;
    Ok(snapshot(session_id, session))
}

/// Forgets a session. A session that is still moving files cannot be closed.
pub fn close_session(session_id: &str) -> Result<()> {
    let mut sessions = lock_sessions()?;
    let session = sessions
        .get(session_id)
        .ok_or_else(|| anyhow!("session not found: {session_id}"))?;
    if session.state.kind() == StateKind::Moving {
        return Err(anyhow!("session {session_id} is still organizing"));
    }
    sessions.remove(session_id);
    Ok(())
}

pub fn doctor(root: Option<&Path>) -> DoctorInfo {
    collect_doctor_info(root)
}

fn scan_directory(request: &OpenDirectoryRequest) -> faxina_core::Result<ScanReport> {
    let options = ScanOptions {
        excludes: request.excludes.clone(),
        scan_id: None,
    };
    let mut scan = run_scan(&request.root, &options)?;

    if request.use_classifier {
        resolve_with_config(&mut scan, ClassifierConfig::from_env());
    }
    Ok(scan)
}

fn snapshot(session_id: &str, session: &Session) -> SessionSnapshot {
    let state = &session.state;
    let scan = state.scan().cloned();
    let categories = scan
        .as_ref()
        .map(|scan| {
            scan.categories
                .iter()
                .map(|(category, files)| (category.clone(), files.len()))
                .collect()
        })
        .unwrap_or_default();

    let (moved, failed) = match state {
        OrganizerState::Done { report, .. } => {
            (report.moved.len() as u64, report.failures.len() as u64)
        }
        _ => (0, 0),
    };
    let (error, blocking) = match state {
        OrganizerState::Error {
            message, blocking, ..
        } => (Some(message.clone()), *blocking),
        _ => (None, false),
    };

    SessionSnapshot {
        session_id: session_id.to_string(),
        root: session.request.root.clone(),
        state: state.kind(),
        progress: state.progress(),
        status: state.status_message(),
        total_files: scan.as_ref().map_or(0, |scan| scan.total_files() as u64),
        categories,
        moved,
        failed,
        error,
        blocking,
        total_events: session.events.len() as u64,
        scan,
    }
}

fn write_report(report: &OrganizeReport, path: &Path) -> Result<()> {
    let payload =
        serde_json::to_string_pretty(report).context("failed to serialize run report")?;
    fs::write(path, payload)
        .with_context(|| format!("failed to write run report to {}", path.display()))
}

fn with_session<T, F>(session_id: &str, apply: F) -> Result<T>
where
    F: FnOnce(&mut Session) -> Result<T>,
{
    let mut sessions = lock_sessions()?;
    let session = sessions
        .get_mut(session_id)
        .ok_or_else(|| anyhow!("session not found: {session_id}"))?;
    apply(session)
}

fn lock_sessions() -> Result<std::sync::MutexGuard<'static, HashMap<String, Session>>> {
    SESSIONS
        .lock()
        .map_err(|_| anyhow!("session registry lock poisoned"))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::{Duration, Instant};

    use faxina_core::{OrganizePhase, OrganizeReport, StateKind};

    use super::{
        close_session, get_session, open_directory, poll_organize_events, rescan,
        start_organization, OpenDirectoryRequest, SessionSnapshot,
    };

    fn wait_until_settled(session_id: &str) -> SessionSnapshot {
        let started = Instant::now();
        loop {
            let snapshot = get_session(session_id).expect("session exists");
            if snapshot.state != StateKind::Moving {
                return snapshot;
            }
            assert!(started.elapsed() < Duration::from_secs(30));
            std::thread::sleep(Duration::from_millis(25));
        }
    }

    #[test]
    fn organizes_directory_in_background() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("downloads");
        fs::create_dir(&root).expect("mkdir");
        fs::write(root.join("photo.png"), b"png").expect("write");
        fs::write(root.join("notes.txt"), b"txt").expect("write");
        let output = temp.path().join("run.json");

        let request = OpenDirectoryRequest {
            output: Some(output.clone()),
            ..OpenDirectoryRequest::new(&root)
        };
        let session_id = open_directory(request).expect("open");

        let ready = get_session(&session_id).expect("snapshot");
        assert_eq!(ready.state, StateKind::Ready);
        assert_eq!(ready.total_files, 2);
        assert_eq!(ready.categories.get("Imagens"), Some(&1));

        start_organization(&session_id).expect("start");
        let done = wait_until_settled(&session_id);
        assert_eq!(done.state, StateKind::Done);
        assert_eq!(done.progress, 100.0);
        assert_eq!(done.moved, 2);
        assert_eq!(done.total_files, 0);

        let events = poll_organize_events(&session_id, 0).expect("events");
        assert_eq!(
            events.last().map(|event| event.phase),
            Some(OrganizePhase::Done)
        );
        let later = poll_organize_events(&session_id, events[0].seq).expect("events");
        assert_eq!(later.len(), events.len() - 1);

        assert!(root.join("Imagens").join("photo.png").is_file());
        assert!(root.join("Documentos").join("notes.txt").is_file());

        let payload = fs::read_to_string(&output).expect("report written");
        let report: OrganizeReport = serde_json::from_str(&payload).expect("report parses");
        assert_eq!(report.moved.len(), 2);

        close_session(&session_id).expect("close");
        assert!(get_session(&session_id).is_err());
    }

    #[test]
    fn unsupported_root_is_reported_as_blocking() {
        let temp = tempfile::tempdir().expect("tempdir");
        let file = temp.path().join("plain.txt");
        fs::write(&file, b"x").expect("write");

        let session_id = open_directory(OpenDirectoryRequest::new(&file)).expect("open");
        let snapshot = get_session(&session_id).expect("snapshot");
        assert_eq!(snapshot.state, StateKind::Error);
        assert!(snapshot.blocking);
        assert!(snapshot.error.is_some());
        assert!(start_organization(&session_id).is_err());
    }

    #[test]
    fn rescan_picks_up_new_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let session_id = open_directory(OpenDirectoryRequest::new(temp.path())).expect("open");
        assert_eq!(get_session(&session_id).expect("snapshot").total_files, 0);

        fs::write(temp.path().join("clip.mp4"), b"mp4").expect("write");
        let snapshot = rescan(&session_id).expect("rescan");
        assert_eq!(snapshot.state, StateKind::Ready);
        assert_eq!(snapshot.categories.get("Vídeos"), Some(&1));
    }

    #[test]
    fn unknown_session_is_an_error() {
        assert!(get_session("missing-session").is_err());
        assert!(start_organization("missing-session").is_err());
        assert!(poll_organize_events("missing-session", 0).is_err());
        assert!(close_session("missing-session").is_err());
    }
}
