//! Prompt assembly.
//!
//! The prompt is a pure function of its inputs. Section order is fixed:
//! persona, rule block, style blocks, output shape, summary, recent turns,
//! optional background facts, detected emotions, then the user message last so
//! nothing in it can re-order the instructions above.

use rapport_schema::{Policy, RuleId, Signal, StyleModifier, Turn};

pub const DEFAULT_RECENT_WINDOW: usize = 6;

/// Separator between rendered turns in the context block.
pub const TURN_SEPARATOR: &str = " | ";

pub const PERSONA: &str = "\
You are a warm, emotionally intelligent conversation partner.

Core style:
- Sound human, grounded and present, like a steady friend rather than a lecturer
- Use modern conversational language without memes, cringe slang or try-hard jokes
- Vary sentence openings; avoid stock starters like \"I understand\" or \"It sounds like\"

Listening:
- Understand first, respond second
- Reflect the emotional meaning, not just the keywords
- Validate feelings before suggesting anything
- Accept slang, frustration or swearing without judgement
- Notice mixed emotions when they are there

Assumptions:
- Never invent personal history for the user
- Never claim they have overcome this before or are \"strong enough\"
- Encourage based on the situation in front of you

Continuity:
- Keep the conversation open without pressure
- Ask at most one gentle follow-up question and never stack questions

Avoid:
- Therapy disclaimers or clinical, diagnostic language
- Generic one-line sympathy
- Long lectures or long paragraphs";

pub const CONTINUITY_LINE: &str =
    "Include one gentle context question to keep conversation flowing.";
pub const LONG_MESSAGE_LINE: &str =
    "Acknowledge at least two emotional elements from the message.";

const OUTPUT_SHAPE: &str = "\
Reply in 3–4 medium sentences.
Natural tone. No robotic phrasing.
No long paragraphs.
Reply in the SAME language as the user.";

pub fn rule_instruction(rule: RuleId) -> &'static str {
    match rule {
        RuleId::Goodbye => "\
User is ending the conversation.
Respond with a warm human goodbye.
If earlier distress exists, include a short care note.
No questions.",
        RuleId::Grief => "\
User is experiencing loss.
Respond with heartfelt comfort and presence.
Write 3–4 medium consoling sentences.
No questions. No advice.",
        RuleId::Injury => "\
User reports a physical injury.
Respond with care and concern.
Encourage rest and proper care.
Ask how it happened.",
        RuleId::Crying => "\
User is crying or near tears.
Respond with soothing reassurance.
Normalize the feeling.
Encourage slow breathing.
Include one gentle supportive question.",
        RuleId::ProfessionalStress => "\
User is describing professional or delivery pressure.
Respond calm and confidence-supportive.
Acknowledge seriousness without dramatizing.
Add subtle morale reinforcement.
Include one forward-looking question about next step.
No therapy tone. No hype tone.",
        RuleId::Identity => "\
User asks who you are.
Answer briefly as a supportive AI assistant who helps with conversations and feelings.
Friendly and natural.",
        RuleId::Casual => "\
User asks a normal lifestyle or preference question.
Answer directly and naturally.
No emotional support tone.",
        RuleId::Hype => "\
User is celebrating or emotionally positive.
Respond with warm grounded excitement and supportive hype.
Include exactly ONE light curiosity question about what they achieved.",
        RuleId::Care => "\
User is emotionally distressed or overwhelmed.
Start with validation and support.
Be human and steady.
Include exactly ONE gentle open-ended question about what happened.
Add one small stabilizing or encouraging line.",
        RuleId::DefaultNeutral => "\
Respond naturally and helpfully to what the user said.",
    }
}

pub fn modifier_instruction(modifier: StyleModifier) -> &'static str {
    match modifier {
        StyleModifier::EnergyMatch => "\
User message shows strong emotional intensity (caps or stretched words).
Match energy slightly with warmer, more animated wording.
Do not use all caps.",
        StyleModifier::SlangMirror => "\
User uses bro-style slang.
You may lightly mirror with \"bro\" or \"dude\" once.
Do not overuse slang.",
    }
}

/// Last `window` turns rendered as `role: text` joined by [`TURN_SEPARATOR`].
pub fn render_context(turns: &[Turn], window: usize) -> String {
    let start = turns.len().saturating_sub(window);
    turns[start..]
        .iter()
        .map(Turn::render)
        .collect::<Vec<_>>()
        .join(TURN_SEPARATOR)
}

#[derive(Debug, Clone)]
pub struct PromptComposer {
    recent_window: usize,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_WINDOW)
    }
}

impl PromptComposer {
    pub fn new(recent_window: usize) -> Self {
        Self { recent_window }
    }

    pub fn recent_window(&self) -> usize {
        self.recent_window
    }

    fn rule_block(policy: &Policy) -> String {
        let mut lines = vec![rule_instruction(policy.rule_id)];
        if policy.continuity_question_required {
            lines.push(CONTINUITY_LINE);
        }
        if policy.long_message_ack {
            lines.push(LONG_MESSAGE_LINE);
        }
        lines.join("\n")
    }

    pub fn compose(
        &self,
        text: &str,
        signal: &Signal,
        policy: &Policy,
        recent_turns: &[Turn],
        rolling_summary: &str,
        knowledge_snippet: &str,
    ) -> String {
        let mut sections: Vec<String> = vec![PERSONA.to_string(), Self::rule_block(policy)];

        sections.extend(
            policy
                .modifiers
                .iter()
                .map(|m| modifier_instruction(*m).to_string()),
        );
        sections.push(OUTPUT_SHAPE.to_string());
        sections.push(format!("Conversation summary:\n{}", rolling_summary.trim()));
        sections.push(format!(
            "Recent turns:\n{}",
            render_context(recent_turns, self.recent_window)
        ));

        let snippet = knowledge_snippet.trim();
        if !snippet.is_empty() {
            sections.push(format!(
                "Helpful background facts (use if relevant):\n{snippet}"
            ));
        }

        let labels = signal.labels();
        let emotions = if labels.is_empty() {
            "none".to_string()
        } else {
            labels.join(", ")
        };
        sections.push(format!(
            "Detected emotions: {emotions} | overall: {}",
            signal.overall_state
        ));
        sections.push(format!("User message:\n{text}"));

        let prompt = sections.join("\n\n");
        tracing::debug!(chars = prompt.len(), rule = %policy.rule_id, "prompt composed");
        prompt
    }
}
