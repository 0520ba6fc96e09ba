use crate::brief::{Brief, GenerationMode};

const QUALITY_REQUIREMENTS: &[&str] = &[
    "High quality, professional graphic design.",
    "Vector style aesthetics (clean edges, scalable look).",
    "White background.",
    "Centered composition.",
    "Make it unique and memorable.",
    "Do not include photorealistic elements, keep it graphical and symbolic.",
];

const REVISE_TASK: &[&str] = &[
    "TASK: Use the attached image as a visual reference, sketch, or previous logo draft.",
    "Analyze this reference and identify its design problems against the brief provided above.",
    "Revise and improve it to be more professional, balanced, and aesthetically pleasing.",
    "Create a new, polished version that aligns with the requirements.",
];

const REMIX_TASK: &[&str] = &[
    "TASK: Create a fresh variation based on the attached reference logo.",
    "Keep the core brand identity and color scheme, but explore a different composition or artistic execution.",
    "Make it distinct from the original.",
];

/// Builds the generation instruction for a brief. Pure: same inputs, same text.
pub fn compose_prompt(brief: &Brief, mode: GenerationMode) -> String {
    let base = base_instructions(brief);
    match mode_suffix(mode) {
        Some(suffix) => format!("{base}\n\n{suffix}"),
        None => base,
    }
}

pub fn base_instructions(brief: &Brief) -> String {
    let mut lines = vec![format!(
        "Design a professional vector logo for a brand named \"{}\".",
        brief.brand_name.trim()
    )];
    if let Some(tagline) = brief.tagline_text() {
        lines.push(format!("Tagline text: \"{tagline}\"."));
    }
    lines.push(String::new());
    lines.push(format!(
        "The business concept/brief is: {}.",
        brief.description.trim()
    ));
    lines.push(String::new());
    lines.push(format!("Visual Style: {}.", brief.style.descriptor()));
    let colors = brief.colors.trim();
    if colors.is_empty() {
        lines.push("Color Palette: designer's choice.".to_string());
    } else {
        lines.push(format!("Color Palette: {colors}."));
    }
    lines.push(String::new());
    lines.push("Requirements:".to_string());
    lines.extend(QUALITY_REQUIREMENTS.iter().map(|item| format!("- {item}")));
    lines.join("\n")
}

fn mode_suffix(mode: GenerationMode) -> Option<String> {
    match mode {
        GenerationMode::Fresh => None,
        GenerationMode::Revise => Some(REVISE_TASK.join("\n")),
        GenerationMode::Remix => Some(REMIX_TASK.join("\n")),
    }
}
