//! Prompt templates for ingredient analysis and follow-up chat.

use kidsafe_core::traits::{ChatMessage, Role};
use kidsafe_core::types::ScoredChunk;

/// Chat turns carried into a follow-up prompt.
pub const HISTORY_WINDOW: usize = 4;

const ANALYSIS_TEMPLATE: &str = "\
You are a pediatric nutrition expert helping parents understand food ingredients for their children.
Use the food labeling guidelines below as evidence.

Cereal Product: {product}
Ingredients List: {ingredients}

Question: {question}

Relevant Guidelines and Information:
{context}

Start your answer with a line of the form
## VERDICT: GOOD, MODERATE or BAD
followed by a one or two sentence summary.

Classify as BAD when any red flag is present: artificial colors (Red 40, Yellow 5, Blue 1), \
artificial flavors or sweeteners, BHT/BHA/TBHQ, high fructose corn syrup, partially hydrogenated oils, \
several added sugars among the first five ingredients, or a sugar as the first or second ingredient.
Classify as MODERATE when added sugars or processed ingredients are present without red flags.
Classify as GOOD when the product is mostly whole, minimally processed ingredients with no added sugar.

Then give a detailed analysis: overall assessment, red flag ingredients, added sugar analysis, \
an ingredient-by-ingredient breakdown, prioritized concerns, and positive aspects.";

const FOLLOW_UP_TEMPLATE: &str = "\
You are a helpful assistant specializing in food ingredients and nutrition for children.

You have already analyzed this product:
Product: {product}
Ingredients: {ingredients}

Previous Analysis:
{previous_analysis}
{history}
User Question: {question}

Answer clearly and concisely from the analysis and your knowledge of food ingredients. \
Keep the answer under 200 words unless more detail is requested.";

/// The retrieval query built from an ingredient list.
pub fn retrieval_question(ingredients: &str) -> String {
    format!(
        "Analyze these food ingredients for a children's cereal product: {ingredients}\n\
         Consider whether the ingredients are safe for children, any concerning additives, \
         preservatives or artificial ingredients, what terms like \"Natural Flavors\" mean, \
         common allergens, and nutritional benefits or concerns."
    )
}

/// Number the chunks as `Source 1`, `Source 2`, ...
pub fn format_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, c)| format!("Source {}:\n{}", i + 1, c.content()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn analysis_prompt(product: &str, ingredients: &str, question: &str, context: &str) -> String {
    ANALYSIS_TEMPLATE
        .replace("{product}", product)
        .replace("{ingredients}", ingredients)
        .replace("{question}", question)
        .replace("{context}", context)
}

/// Render the last [`HISTORY_WINDOW`] turns, or nothing when the history is
/// only the opening message.
pub fn format_history(history: &[ChatMessage]) -> String {
    if history.len() <= 1 { return String::new(); }
    let start = history.len().saturating_sub(HISTORY_WINDOW);
    let mut out = String::from("\nPrevious conversation:\n");
    for msg in &history[start..] {
        let speaker = if msg.role == Role::User { "User" } else { "Assistant" };
        out.push_str(&format!("{speaker}: {}\n", msg.content));
    }
    out
}

pub fn follow_up_prompt(product: &str, ingredients: &str, previous_analysis: &str, history: &[ChatMessage], question: &str) -> String {
    FOLLOW_UP_TEMPLATE
        .replace("{product}", product)
        .replace("{ingredients}", ingredients)
        .replace("{previous_analysis}", previous_analysis)
        .replace("{history}", &format_history(history))
        .replace("{question}", question)
}
