use crate::errors::ChatError;

/// One segment of a structured user input.
///
/// Serialized as `{"type": "text" | "image" | "audio" | "file", ...}`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
#[non_exhaustive]
pub enum InputPart {
    /// Plain text segment.
    Text { text: String },
    /// Image referenced by URL (remote or data URL).
    Image { url: String },
    /// Audio clip referenced by URL.
    Audio { url: String },
    /// Arbitrary attachment referenced by URL.
    File {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(
            default,
            rename = "mimeType",
            skip_serializing_if = "Option::is_none"
        )]
        mime_type: Option<String>,
    },
}

impl InputPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self::Image { url: url.into() }
    }

    pub fn audio(url: impl Into<String>) -> Self {
        Self::Audio { url: url.into() }
    }

    pub fn file(url: impl Into<String>, name: Option<String>) -> Self {
        Self::File {
            url: url.into(),
            name,
            mime_type: None,
        }
    }

    fn validate(&self) -> Result<(), ChatError> {
        match self {
            Self::Text { text } if text.trim().is_empty() => Err(ChatError::Validation(
                "text part must not be empty".into(),
            )),
            Self::Image { url } | Self::Audio { url } | Self::File { url, .. }
                if url.trim().is_empty() =>
            {
                Err(ChatError::Validation(
                    "attachment part must carry a url".into(),
                ))
            }
            _ => Ok(()),
        }
    }

    fn display(&self) -> String {
        match self {
            Self::Text { text } => text.clone(),
            Self::Image { .. } => "[image]".into(),
            Self::Audio { .. } => "[audio]".into(),
            Self::File { name, .. } => match name {
                Some(name) => format!("[file: {name}]"),
                None => "[file]".into(),
            },
        }
    }
}

/// User input sent with a request: plain text or a multi-part array.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum UserInput {
    Text(String),
    Parts(Vec<InputPart>),
}

impl UserInput {
    /// Rejects blank text, empty part lists, and parts missing their payload.
    pub fn validate(&self) -> Result<(), ChatError> {
        match self {
            Self::Text(text) if text.trim().is_empty() => Err(ChatError::Validation(
                "message text must not be empty".into(),
            )),
            Self::Text(_) => Ok(()),
            Self::Parts(parts) if parts.is_empty() => Err(ChatError::Validation(
                "at least one input part is required".into(),
            )),
            Self::Parts(parts) => parts.iter().try_for_each(InputPart::validate),
        }
    }

    /// Text stored as the user message content.
    ///
    /// Attachments render as bracketed placeholders.
    pub fn display_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .map(InputPart::display)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl From<String> for UserInput {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for UserInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<InputPart>> for UserInput {
    fn from(value: Vec<InputPart>) -> Self {
        Self::Parts(value)
    }
}
