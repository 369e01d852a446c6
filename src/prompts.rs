//! Prompt payloads for vision-assisted discovery.
//!
//! Treated as opaque text by the rest of the engine. The inventory prompt
//! deliberately works from the screenshot alone so the model reasons from
//! what a human would see, not from markup hints.

/// System-style instruction for the visual inventory call.
pub const VISUAL_INVENTORY_PROMPT: &str = "\
You are a senior front-end engineer and UI/UX analyst reverse-engineering a web application.
Perform an exhaustive visual inventory of the provided screenshot. Nothing is too small.
Organize your response using ONLY this hierarchical structure:
1. Layout & Structural Elements
   - Overall page layout, fixed/sticky containers, scroll boundaries
2. Navigation Components
   - Primary/secondary navigation, tab groups with active state, icon buttons
3. Interactive Controls
   - Buttons with visible text and state, toggles, inputs, filters
4. Content & Data Display
   - Cards, lists, tables, repeated rows (describe row structure in detail),
     headings, labels, timestamps, scores, badges, live indicators
5. Advertising & Promotional
   - Ad containers and their close buttons
6. System & Feedback Elements
   - Consent banners, modals, loading skeletons, spinners
7. Other Notable Elements

For every element use brief naming: \"UI Element Name: Exact Text (or Function if no text)\".
Include position, repetition, and state. Be exhaustive. Do not summarize.";

/// Mapping prompt for targeted discovery of exactly one element key.
pub fn build_targeted_mapping_prompt(
    context: &str,
    element_key: &str,
    diagnostic: Option<&str>,
    inventory: &str,
    html: &str,
) -> String {
    format!(
        "You are an elite front-end reverse-engineer. Find the CSS selector for ONE specific element.\n\
         \n\
         ### GOAL\n\
         Find the CSS selector for the key: \"{element_key}\" in the context \"{context}\".\n\
         \n\
         ### CRITICAL RULES\n\
         1. Return ONLY a JSON object with this exact structure: {{\"{element_key}\": \"<css_selector>\"}}\n\
         2. If the element is NOT visible in the current page state (behind a tab, collapsed section, \
         or requiring interaction to reveal), return an EMPTY JSON object: {{}}\n\
         3. DO NOT guess. DO NOT return selectors for elements you cannot see.\n\
         4. RETURN ONLY valid JSON. No markdown. No explanations.\n\
         \n\
         ### SELECTOR QUALITY\n\
         - Prefer IDs > data-attributes > specific classes.\n\
         - Avoid unstable generated class names.\n\
         - Ensure the selector uniquely identifies the element.\n\
         \n\
         ### CONTEXT\n\
         {diag}\n\
         \n\
         ### INPUT\n\
         --- VISUAL INVENTORY ---\n\
         {inventory}\n\
         --- CLEANED HTML SOURCE ---\n\
         {html}\n\
         Return ONLY the JSON mapping.",
        diag = diagnostic.unwrap_or("")
    )
}

/// Mapping prompt for bulk discovery over a context's known key set.
pub fn build_bulk_mapping_prompt(keys: &[String], inventory: &str, html: &str) -> String {
    let keys_list = keys
        .iter()
        .map(|k| format!("\"{k}\""))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "You are an elite front-end reverse-engineer. Your task is a STRICT UPSERT of CSS selectors.\n\
         \n\
         ### GOAL\n\
         For the given list of EXISTING KEYS, find the most accurate CSS selector in the provided HTML.\n\
         \n\
         ### CRITICAL RULES\n\
         1. ONLY return keys from this list: [{keys_list}]\n\
         2. DO NOT create new keys.\n\
         3. DO NOT modify the structure of the keys.\n\
         4. If you cannot find a selector for a key (behind a tab, collapsed, not visible), OMIT it \
         from the response. This is EXPECTED; not all elements are visible at once.\n\
         5. RETURN ONLY a valid JSON object. No markdown. No explanations.\n\
         \n\
         ### SELECTOR QUALITY\n\
         - Prefer IDs > data-attributes > specific classes.\n\
         - Avoid unstable generated class names.\n\
         - Ensure selectors are uniquely identifiable within the context.\n\
         \n\
         ### INPUT\n\
         --- VISUAL INVENTORY ---\n\
         {inventory}\n\
         --- CLEANED HTML SOURCE ---\n\
         {html}\n\
         Return ONLY the JSON mapping."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targeted_prompt_embeds_key_and_diagnostic() {
        let p = build_targeted_mapping_prompt(
            "match_page",
            "home_score",
            Some("previous selector timed out"),
            "inventory text",
            "<div></div>",
        );
        assert!(p.contains("\"home_score\""));
        assert!(p.contains("match_page"));
        assert!(p.contains("previous selector timed out"));
        assert!(p.contains("inventory text"));
    }

    #[test]
    fn test_bulk_prompt_lists_all_keys() {
        let keys = vec!["home_score".to_string(), "away_score".to_string()];
        let p = build_bulk_mapping_prompt(&keys, "inv", "<html></html>");
        assert!(p.contains("\"home_score\", \"away_score\""));
        assert!(p.contains("STRICT UPSERT"));
    }
}
