/// Visual identity shared by every thumbnail of the channel
pub const STYLE_PALETTE: &str = "warm terracotta orange (#E86A33), cream (#F6EEDF), deep olive green (#41644A) and charcoal (#263A29)";

const MAX_TITLE_CHARS: usize = 80;

/// Build the generation prompt for a story title.
///
/// The reference image carries the presenter avatar; the prompt pins down the
/// rest of the layout so every episode looks like part of the same series.
pub fn build_prompt(title: &str, width: u32, height: u32) -> String {
    let title = sanitize_title(title);

    format!(
        "Create a YouTube thumbnail ({width}x{height}, 16:9 landscape) for a cozy audiobook-while-cooking channel.\n\
         \n\
         Use the attached image as the style and character reference: keep the same person, face, hair and outfit, \
         drawn as a soft hand-painted illustration, placed on the right third of the frame, smiling and holding a wooden spoon.\n\
         \n\
         Background: a warm rustic kitchen with a steaming pot, fresh herbs and soft window light, slightly blurred.\n\
         Color palette: {palette}. High contrast between text and background.\n\
         \n\
         Title text on the left two thirds, at most three lines, thick rounded sans-serif, cream letters with a charcoal outline \
         and a subtle drop shadow:\n\
         \"{title}\"\n\
         \n\
         Add a small open-book icon and a headphone icon in the top-left corner. No watermarks, no extra text, no borders. \
         Return the image only.",
        width = width,
        height = height,
        palette = STYLE_PALETTE,
        title = title,
    )
}

/// Collapse whitespace, drop quotes that would break the prompt, cap the length
fn sanitize_title(title: &str) -> String {
    let collapsed = title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('"', "'");

    if collapsed.chars().count() <= MAX_TITLE_CHARS {
        collapsed
    } else {
        let cut: String = collapsed.chars().take(MAX_TITLE_CHARS - 1).collect();
        format!("{}…", cut.trim_end())
    }
}
