use serde::Deserialize;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fs;
use std::sync::Arc;
use log::info;

const DEFAULT_SYSTEM_PROMPT: &str =
    "Tu es un tuteur bienveillant pour des élèves francophones. Réponds en français, \
explique étape par étape et vérifie la compréhension de l'élève avant d'aller plus loin.";

#[derive(Debug)]
pub enum PromptError {
    IoError(std::io::Error),
    JsonError(serde_json::Error),
    EmptyPrompt(String),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
            PromptError::EmptyPrompt(key) => write!(f, "Prompt for subject '{}' is empty", key),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

/// System prompts keyed by subject tag.
#[derive(Deserialize, Debug, Clone)]
pub struct SubjectPrompts {
    #[serde(default = "default_prompt")]
    pub default: String,
    #[serde(default)]
    pub subjects: HashMap<String, String>,
}

fn default_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

impl Default for SubjectPrompts {
    fn default() -> Self {
        let subjects = [
            (
                "maths",
                "Tu es un tuteur de mathématiques. Guide l'élève vers la solution sans la donner \
immédiatement, détaille chaque calcul et écris les formules clairement.",
            ),
            (
                "physique",
                "Tu es un tuteur de physique-chimie. Relie chaque notion à un phénomène concret, \
précise les unités et vérifie les ordres de grandeur.",
            ),
            (
                "francais",
                "Tu es un tuteur de français. Aide l'élève en grammaire, orthographe et analyse de \
texte, en citant les règles utilisées.",
            ),
        ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Self {
            default: DEFAULT_SYSTEM_PROMPT.to_string(),
            subjects,
        }
    }
}

impl SubjectPrompts {
    /// Unknown subjects fall back to the generic tutor prompt.
    pub fn for_subject(&self, subject: &str) -> &str {
        self.subjects
            .get(&subject.trim().to_lowercase())
            .map(String::as_str)
            .unwrap_or(self.default.as_str())
    }

    fn validate(&self) -> Result<(), PromptError> {
        if self.default.trim().is_empty() {
            return Err(PromptError::EmptyPrompt("default".to_string()));
        }
        for (subject, prompt) in &self.subjects {
            if prompt.trim().is_empty() {
                return Err(PromptError::EmptyPrompt(subject.clone()));
            }
        }
        Ok(())
    }
}

pub fn load_prompts_from_str(json: &str) -> Result<SubjectPrompts, PromptError> {
    let mut prompts: SubjectPrompts = serde_json::from_str(json)?;
    prompts.subjects = prompts.subjects
        .into_iter()
        .map(|(k, v)| (k.to_lowercase(), v))
        .collect();
    prompts.validate()?;
    Ok(prompts)
}

/// Loads prompts from `path`, or the built-in set when no path is given.
pub fn load_prompts(path: Option<&str>) -> Result<Arc<SubjectPrompts>, PromptError> {
    match path {
        Some(path) => {
            let file_content = fs::read_to_string(path)?;
            let prompts = load_prompts_from_str(&file_content)?;
            info!("Loaded {} subject prompts from {}", prompts.subjects.len(), path);
            Ok(Arc::new(prompts))
        }
        None => Ok(Arc::new(SubjectPrompts::default())),
    }
}
