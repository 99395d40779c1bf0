use std::env;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::categorize::apply_classification;
use crate::error::{FaxinaError, Result};
use crate::model::{CategorizationSource, ScanReport, CATCH_ALL_CATEGORY};

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ClassificationRequest {
    pub file_names: Vec<String>,
    #[serde(default)]
    pub existing_subfolders: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedGroup {
    pub category_name: String,
    #[serde(default)]
    pub files: Vec<String>,
}

/// External collaborator that groups file names into named categories.
pub trait FileClassifier {
    fn name(&self) -> &str;

    fn classify(&self, request: &ClassificationRequest) -> Result<Vec<ClassifiedGroup>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl ClassifierConfig {
    /// `None` when no API key is configured.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("GEMINI_API_KEY")
            .or_else(|| lookup("API_KEY"))
            .filter(|value| !value.trim().is_empty())?;
        Some(Self {
            api_key,
            model: lookup("FAXINA_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: lookup("FAXINA_CLASSIFIER_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        })
    }
}

pub struct GeminiClassifier {
    client: Client,
    config: ClassifierConfig,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Deserialize)]
struct ContentPart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct CategoriesPayload {
    #[serde(default)]
    categories: Vec<ClassifiedGroup>,
}

impl GeminiClassifier {
    pub fn new(config: ClassifierConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url, self.config.model
        )
    }
}

impl FileClassifier for GeminiClassifier {
    fn name(&self) -> &str {
        &self.config.model
    }

    fn classify(&self, request: &ClassificationRequest) -> Result<Vec<ClassifiedGroup>> {
        let body = json!({
            "contents": [{ "parts": [{ "text": build_prompt(request) }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": response_schema(),
            },
        });

        debug!(
            "sending {} file name(s) to classifier model {}",
            request.file_names.len(),
            self.config.model
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()?;

        if !response.status().is_success() {
            return Err(FaxinaError::Classifier(format!(
                "classifier returned status {}",
                response.status()
            )));
        }

        let payload: GenerateResponse = response.json()?;
        let text = payload
            .candidates
            .into_iter()
            .filter_map(|candidate| candidate.content)
            .flat_map(|content| content.parts)
            .find_map(|part| part.text)
            .unwrap_or_default();

        parse_groups(&text)
    }
}

pub fn build_prompt(request: &ClassificationRequest) -> String {
    let names = serde_json::to_string(&request.file_names).unwrap_or_else(|_| "[]".to_string());
    let mut prompt = format!(
        "You are an expert file organizer. I will provide a list of filenames.\n\
         Analyze them and group them into logical folders based on their content, context, extension, and name.\n\n\
         Rules:\n\
         1. Create meaningful category names in Portuguese (Brazil). Examples: \"Financeiro\", \"Projetos\", \"Fotos Pessoais\", \"Instaladores\".\n\
         2. If a file is ambiguous, put it in \"{CATCH_ALL_CATEGORY}\".\n\
         3. Do not leave any file uncategorized.\n"
    );
    if !request.existing_subfolders.is_empty() {
        let folders = serde_json::to_string(&request.existing_subfolders)
            .unwrap_or_else(|_| "[]".to_string());
        prompt.push_str(&format!(
            "4. Prefer these existing folders when a file fits one of them: {folders}\n"
        ));
    }
    prompt.push_str(&format!("\nFiles to organize:\n{names}"));
    prompt
}

fn response_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "categories": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "categoryName": {
                            "type": "STRING",
                            "description": "The name of the folder/category in Portuguese",
                        },
                        "files": {
                            "type": "ARRAY",
                            "items": { "type": "STRING" },
                            "description": "List of filenames belonging to this category",
                        },
                    },
                    "required": ["categoryName", "files"],
                },
            },
        },
    })
}

/// Parses the classifier's JSON text. Blank text means "no answer" and yields
/// an empty list.
pub fn parse_groups(text: &str) -> Result<Vec<ClassifiedGroup>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end().trim_end_matches("```").trim())
        .unwrap_or(trimmed);
    let payload: CategoriesPayload = serde_json::from_str(trimmed)?;
    Ok(payload.categories)
}

/// Replaces the extension-based mapping of `report` with the classifier's
/// answer when it is usable. Errors, empty and malformed answers leave the
/// extension mapping in place and add a warning.
pub fn resolve_categories(
    report: &mut ScanReport,
    classifier: &dyn FileClassifier,
) -> CategorizationSource {
    if report.files.is_empty() {
        return report.categorization;
    }

    let request = ClassificationRequest {
        file_names: report.file_names(),
        existing_subfolders: report.existing_subfolders.clone(),
    };

    match classifier.classify(&request) {
        Ok(groups) if assigns_any(&groups, &request.file_names) => {
            let mut warnings = Vec::new();
            report.categories = apply_classification(&report.files, &groups, &mut warnings);
            report.warnings.extend(warnings);
            report.categorization = CategorizationSource::Classifier;
            info!(
                "classifier {} produced {} categor(ies) for {} file(s)",
                classifier.name(),
                report.categories.len(),
                report.files.len()
            );
        }
        Ok(_) => {
            warn!(
                "classifier {} assigned none of the scanned files",
                classifier.name()
            );
            report.warnings.push(
                "classifier assigned none of the scanned files; using extension rules."
                    .to_string(),
            );
        }
        Err(err) => {
            warn!("classifier {} failed: {}", classifier.name(), err);
            report.warnings.push(format!(
                "classifier unavailable ({err}); using extension rules."
            ));
        }
    }
    report.categorization
}

/// Runs the configured remote classifier over `report`. A missing key or a
/// client that cannot be built leaves the extension mapping with a warning.
pub fn resolve_with_config(
    report: &mut ScanReport,
    config: Option<ClassifierConfig>,
) -> CategorizationSource {
    if report.files.is_empty() {
        return report.categorization;
    }
    let Some(config) = config else {
        warn!("classifier requested but no API key is configured");
        report.warnings.push(
            "classifier requested but GEMINI_API_KEY/API_KEY is not set; using extension rules."
                .to_string(),
        );
        return report.categorization;
    };
    match GeminiClassifier::new(config) {
        Ok(classifier) => resolve_categories(report, &classifier),
        Err(err) => {
            warn!("classifier client could not be built: {}", err);
            report.warnings.push(format!(
                "classifier unavailable ({err}); using extension rules."
            ));
            report.categorization
        }
    }
}

/// An answer is only usable when it places at least one scanned file.
fn assigns_any(groups: &[ClassifiedGroup], file_names: &[String]) -> bool {
    groups
        .iter()
        .flat_map(|group| group.files.iter())
        .any(|name| file_names.contains(name))
}
