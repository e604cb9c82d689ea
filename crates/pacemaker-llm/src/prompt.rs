use pacemaker_core::config::BotIdentity;
use pacemaker_core::types::StructuredContext;

const PERSONA: &str = "You are a conversational assistant operating inside a group chat. \
You decide, on your own judgment, whether the conversation currently warrants a reply.";

const STYLE_GUIDANCE: &str = "Guidance: be concise; match the register of the conversation; \
never invent facts about participants; prefer silence over a low-value reply.";

const FORMAT_INSTRUCTIONS: &str = r#"Respond with JSON only, no prose outside the JSON object, \
in exactly one of these two shapes:
{"messages": ["...", "..."], "thinking": "..."}
{"reason": "...", "thinking": "..."}
Use the first shape to reply, the second to decide not to reply."#;

/// Build the prompt for a fresh call (spec §4.2 step 1): persona, style
/// guidance, bot identity, the serialized structured context, then the
/// format instructions.
pub fn build_prompt(bot: &BotIdentity, user_message: &str, context: &StructuredContext) -> String {
    let context_json =
        serde_json::to_string_pretty(context).unwrap_or_else(|_| "{}".to_string());

    format!(
        "{persona}\n\n{style}\n\nYou are speaking as: {bot_name} (id: {bot_id}).\n\n\
         Conversation context:\n{context_json}\n\nCurrent message:\n{user_message}\n\n{format_instructions}",
        persona = PERSONA,
        style = STYLE_GUIDANCE,
        bot_name = bot.display_name(),
        bot_id = bot.bot_id,
        context_json = context_json,
        user_message = user_message,
        format_instructions = FORMAT_INSTRUCTIONS,
    )
}

/// Build the one-shot reformat retry prompt (spec §4.2 step 3): the original
/// prompt plus the malformed response plus an explicit instruction to fix it.
pub fn build_reformat_prompt(original_prompt: &str, malformed_response: &str) -> String {
    format!(
        "{original_prompt}\n\n\
         Your previous response could not be parsed as JSON:\n{malformed_response}\n\n\
         Reformat your answer as valid JSON matching exactly one of the two shapes above. \
         Do not include any text outside the JSON object."
    )
}
