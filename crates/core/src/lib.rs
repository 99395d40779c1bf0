pub mod backend;
pub mod categorize;
pub mod classifier;
pub mod doctor;
pub mod error;
pub mod markdown;
pub mod model;
pub mod organize;
pub mod scan;
pub mod state;

pub use backend::{ChildEntry, ChildKind, DirectoryBackend, NativeBackend};
pub use categorize::{
    apply_classification, categorize_entries, categorize_file, file_extension, known_categories,
    DOCUMENTS_CATEGORY, IMAGES_CATEGORY, VIDEOS_CATEGORY,
};
pub use classifier::{
    resolve_categories, resolve_with_config, ClassificationRequest, ClassifiedGroup,
    ClassifierConfig, FileClassifier, GeminiClassifier,
};
pub use doctor::{collect_doctor_info, DoctorInfo, RootDiagnostics};
pub use error::{FaxinaError, Result};
pub use markdown::render_markdown_summary;
pub use model::{
    CategorizationSource, CategorizedFiles, Category, FileEntry, MoveFailure, MoveStage,
    MovedFile, OrganizeEvent, OrganizePhase, OrganizeReport, ScanReport, CATCH_ALL_CATEGORY,
    REPORT_VERSION,
};
pub use organize::{
    run_organize, run_organize_with_backend, run_organize_with_callback, OrganizeOptions,
};
pub use scan::{run_scan, run_scan_with_backend, ScanOptions};
pub use state::{OrganizerState, StateKind};
