//! Fixed prompt text.

use groundchat_core::message::Message;

/// Instructions for the query-rewriting call.
pub const QUERY_PROMPT: &str = "Below is a history of the conversation so far, and a new question asked by the user that needs to be answered by searching for information.
You have access to a search service with rich search capabilities that can retrieve, summarize, and create search queries from prompts.
Generate a search query based on the conversation and the user question.
If you cannot determine a search query from the conversation, return just the number 0.
Do not include any text inside [] or <> in the search query terms.
Do not include any special characters like \"*\".
If the question is not in English, translate the question to English before generating the search query.
If you cannot generate a search query, return just the number 0.
";

/// Prefix for the user turn of the query-rewriting call.
pub const QUERY_REQUEST_PREFIX: &str = "Generate a search query for: ";

/// Grounded answer instructions. `{injected_prompt}` and
/// `{follow_up_questions_prompt}` are substituted per request.
pub const ANSWER_TEMPLATE: &str = "You are an AI Assistant. You will be given a question and a source and a chat history. Use the sources to answer the question. If you don't have information from the sources like publicly available information, or if the user is thanking you or says \"I'm unable to provide help\", don't format your answer using the source format. Write in a natural conversational way.
Each source should have a name followed by colon and the actual information. Don't format any mathematical formula in LaTeX, if you want to format a formula use unicode characters instead.
Don't assume sources, list each source separately, for example [info1.txt][info2.pdf].
If the sources are empty or do not contain the answer, say you don't know.
{injected_prompt}{follow_up_questions_prompt}";

/// Follow-up instruction block, included when the caller asks for suggestions.
pub const FOLLOW_UP_PROMPT: &str = "
Generate 3 very brief follow-up questions that the user would likely ask next.
Enclose the follow-up questions in double angle brackets. Example:
<<Are there exclusions for prescriptions?>>
<<Which pharmacies can be ordered from?>>
Do not repeat questions that have already been asked.
Make sure the last question ends with \">>\".
";

const INJECT_PREFIX: &str = ">>>";

/// Few-shot examples for query rewriting. The last pair shows the "0"
/// reply for turns that need no search.
pub fn query_few_shots() -> Vec<Message> {
    vec![
        Message::user("What are my health plans?"),
        Message::assistant("health insurance plans"),
        Message::user("does my plan cover cardio?"),
        Message::assistant("cardio health plan coverage"),
        Message::user("thanks"),
        Message::assistant("0"),
    ]
}

/// Build the answer system message.
///
/// No template: the base instructions. A template starting with `>>>` is
/// injected into the base instructions; any other template replaces them.
pub fn answer_system_message(prompt_template: Option<&str>, suggest_followups: bool) -> String {
    let follow_ups = if suggest_followups { FOLLOW_UP_PROMPT } else { "" };

    let (template, injected) = match prompt_template {
        None => (ANSWER_TEMPLATE, String::new()),
        Some(t) => match t.strip_prefix(INJECT_PREFIX) {
            Some(extra) => (ANSWER_TEMPLATE, format!("{extra}\n")),
            None => (t, String::new()),
        },
    };

    // Injected text is substituted last so it is never itself expanded.
    template
        .replace("{follow_up_questions_prompt}", follow_ups)
        .replace("{injected_prompt}", &injected)
}

/// The current question with the retrieved sources attached.
pub fn with_sources(question: &str, sources: &str) -> String {
    format!("{question}\n\nSources:\n{sources}")
}
