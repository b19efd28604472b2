//! Prompts for structured signal extraction
//!
//! Both prompts ask for a single JSON object. Placeholder: {query}

/// System prompt shared by both extraction modes
pub const EXTRACTION_SYSTEM_PROMPT: &str =
    "You are a pre-processing step for a recipe recommendation tool. You always answer with a single JSON object.";

/// Full categorization: task category, user facts, and a direct answer for non-task input
pub const CATEGORIZE_PROMPT: &str = r#"The first objective is to determine if the following query is one of 2 potential categories: 1) primary_task 2) other. Label the category primary_task if the goal of the query is to get a recipe or a recipe recommendation. If it is of category "other" you will generate a response to the query and add it to the resulting JSON object.

The second objective is to capture any relevant info expressed within the query, regardless of its category, that will help us understand the type of recipes the user likes. Relevant info could be "I don't love green beans", dietary restrictions such as gluten-free, vegetarian or paleo, allergies, or phrases like "I hate <thing>". Capture each item with a word that expresses sentiment such as "likes", "dislikes" or "allergic to" so the user's relationship with it is clear.

Return a JSON object with exactly these keys:
{
  "category": "primary_task" or "other",
  "relevant_info": ["list of strings, empty if none"],
  "answer": "response to the query if category is other, otherwise an empty string"
}

Query: {query}"#;

/// Facts-only extraction
pub const FACTS_PROMPT: &str = r#"Capture any relevant info expressed within the following query that will help us understand the type of recipes the user likes. Relevant info could be "I don't love green beans", dietary restrictions such as gluten-free, vegetarian or paleo, allergies, or phrases like "I hate <thing>". Capture each item with a word that expresses sentiment such as "likes", "dislikes" or "allergic to" so the user's relationship with it is clear.

Return a JSON object with exactly this key:
{
  "relevant_info": ["list of strings, empty if none"]
}

Query: {query}"#;
