//! Grounded prompt assembly
//!
//! Pure string templating. Sections always appear in the same order:
//! chat history, user facts, the query, then retrieved context.

/// System prompt for the final answer
pub const ANSWER_SYSTEM_PROMPT: &str = "You are a tool helping people pick recipes.";

const PREAMBLE: &str = "Use the provided context below to generate recipe(s) for the user.
Utilize the recipe starters, user relevant info, and chat history to return a relevant response
to the user's query. Primarily utilize the recipe starters as the base of your response but supplement
as necessary. If there are no recipe starters at all, respond with \"I don't know\".";

const EMPTY_SECTION: &str = "(none)";

fn section(out: &mut String, label: &str, body: &str) {
    out.push_str(label);
    out.push_str(":\n\n");
    if body.trim().is_empty() {
        out.push_str(EMPTY_SECTION);
    } else {
        out.push_str(body);
    }
    out.push_str("\n\n");
}

/// Build the user prompt for the answer call
pub fn build_prompt(
    query: &str,
    retrieved_context: &str,
    chat_history: &[String],
    relevant_info: &[String],
) -> String {
    let mut prompt = String::with_capacity(
        PREAMBLE.len()
            + query.len()
            + retrieved_context.len()
            + chat_history.iter().map(|m| m.len() + 1).sum::<usize>()
            + relevant_info.iter().map(|f| f.len() + 1).sum::<usize>()
            + 128,
    );

    prompt.push_str(PREAMBLE);
    prompt.push_str("\n\n");
    section(&mut prompt, "Recent chat history", &chat_history.join("\n"));
    section(&mut prompt, "User relevant info", &relevant_info.join("\n"));
    section(&mut prompt, "User query", query);
    section(&mut prompt, "Recipe starters", retrieved_context);
    prompt.push_str("Answer:\n");
    prompt
}
