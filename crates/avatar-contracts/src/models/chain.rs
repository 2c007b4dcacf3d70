use indexmap::IndexSet;

pub const DEFAULT_MODEL_CHAIN: [&str; 3] =
    ["gemini-2.0-flash", "gemini-flash-latest", "gemini-2.5-flash"];

/// Ordered, duplicate-free list of model ids tried by the fallback generator.
///
/// Order encodes operator preference and is never rearranged.
#[derive(Debug, Clone)]
pub struct ModelChain {
    models: IndexSet<String>,
}

impl ModelChain {
    pub fn new<I, S>(models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            models: models
                .into_iter()
                .map(|model| {
                    let model: String = model.into();
                    model.trim().to_string()
                })
                .filter(|model| !model.is_empty())
                .collect(),
        }
    }

    /// Parses a comma-separated override such as `AVATAR_MODELS`.
    pub fn parse(raw: &str) -> Self {
        Self::new(raw.split(','))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn contains(&self, model: &str) -> bool {
        self.models.contains(model)
    }
}

// `IndexSet` equality ignores order; two chains are equal only when they try
// the same ids in the same sequence.
impl PartialEq for ModelChain {
    fn eq(&self, other: &Self) -> bool {
        self.models.iter().eq(other.models.iter())
    }
}

impl Eq for ModelChain {}

impl Default for ModelChain {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL_CHAIN)
    }
}
