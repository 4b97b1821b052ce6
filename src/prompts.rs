use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

use crate::models::{GenerationJob, PromptTemplate};

static OPTIMIZED_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^Optimized\s*(image\s*generation\s*)?prompt:\s*").expect("valid regex")
});
static OPTIMIZED_ZH_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^優化後的提示詞:\s*").expect("valid regex"));
static HERES_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^Here's\s*(an?\s*)?optimized\s*(version\s*(of\s*)?)?.*?:\s*").expect("valid regex")
});
static STYLE_EDIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)風格|style|cartoon|anime|watercolor|oil painting|sketch|realistic|abstract|vintage|modern")
        .expect("valid regex")
});

/// Splits multi-line entries into one prompt per line and drops blanks.
pub fn expand_prompts(prompts: &[String]) -> Vec<String> {
    prompts
        .iter()
        .flat_map(|p| p.split('\n'))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Job `i` gets seed `seed + i`.
pub fn build_jobs(
    prompts: &[String],
    width: u32,
    height: u32,
    seed: i64,
    style_weight: f64,
    references: &[String],
) -> Vec<GenerationJob> {
    prompts
        .iter()
        .enumerate()
        .map(|(index, prompt)| GenerationJob {
            id: Uuid::new_v4(),
            prompt: prompt.clone(),
            width,
            height,
            seed: seed.wrapping_add(index as i64),
            style_weight,
            reference_images: references.to_vec(),
        })
        .collect()
}

/// Removes the boilerplate some models put in front of an optimized prompt.
pub fn strip_preamble(text: &str) -> String {
    let text = OPTIMIZED_PREFIX_RE.replace(text, "");
    let text = OPTIMIZED_ZH_PREFIX_RE.replace(&text, "");
    let text = HERES_PREFIX_RE.replace(&text, "");
    text.trim().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    Style,
    Content,
}

impl EditKind {
    pub fn classify(instructions: &str) -> Self {
        if STYLE_EDIT_RE.is_match(instructions) { Self::Style } else { Self::Content }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Style => "Style Edit",
            Self::Content => "Content Edit",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditPlan {
    pub kind: EditKind,
    pub prompt: String,
    pub label: String,
}

pub fn plan_edit(original_prompt: Option<&str>, instructions: &str) -> EditPlan {
    let original = original_prompt.map(str::trim).filter(|p| !p.is_empty()).unwrap_or("an image");
    let instructions = instructions.trim();
    let kind = EditKind::classify(instructions);
    let prompt = match kind {
        EditKind::Style => format!(
            "The exact same subject, composition, and scene as described in: \"{original}\". \
            Apply this style modification: {instructions}. Keep all the original elements, characters, objects, \
            and layout exactly the same, only change the artistic style and rendering technique. High quality, detailed result."
        ),
        EditKind::Content => format!(
            "Based on \"{original}\", make this specific modification: {instructions}. \
            Keep the main subject and overall composition similar to the original, but apply the requested changes. \
            High quality, detailed, professional result."
        ),
    };
    let label = format!("{}: {} (based on: {})", kind.label(), instructions, original);
    EditPlan { kind, prompt, label }
}

pub fn templates() -> Vec<PromptTemplate> {
    [
        ("Landscape Photography", "A breathtaking landscape photograph, golden hour lighting, cinematic composition, high resolution, professional photography"),
        ("Portrait", "Portrait photography, natural lighting, detailed facial features, professional studio quality, high resolution"),
        ("Sci-Fi Scene", "Futuristic sci-fi scene, neon lights, cyberpunk atmosphere, high tech environment, detailed rendering"),
        ("Wildlife", "Wildlife photography, natural habitat, detailed fur texture, professional nature photography, high quality"),
        ("Architecture", "Modern architecture, clean lines, minimalist design, professional architectural photography, high resolution"),
    ]
    .into_iter()
    .zip(1..)
    .map(|((name, prompt), id)| PromptTemplate { id, name: name.into(), prompt: prompt.into() })
    .collect()
}
