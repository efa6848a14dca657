//! Built-in branches for trying the bot from a terminal.

use std::sync::{Arc, Weak};

use reflex_branches::{Condition, Conditions, Pattern};
use reflex_core::State;
use reflex_dialogue::{Dialogue, DialogueController};
use reflex_middleware::{complete_async, MiddlewareError};
use reflex_thoughts::{BotMemory, Runtime};
use serde_json::json;

type Reaction = reflex_middleware::Result<()>;

/// Register the demo branches on the runtime's global set.
pub fn install(runtime: &Runtime) -> reflex_branches::Result<()> {
    let greeting = Pattern::regex(r"^(hi|hello|hey)\b")?;
    let ping = Pattern::regex(r"^ping$")?;
    let remember = Pattern::from(Conditions::new().add("note", Condition::after("remember"))?);
    let recall = Pattern::regex(r"what did i (say|tell you)")?;
    let quiz = Pattern::regex(r"^quiz$")?;

    let memory = Arc::clone(runtime.memory());
    let recall_memory = Arc::clone(&memory);
    let dialogues = runtime.dialogues().clone();

    runtime.branches(|b| {
        b.direct(
            greeting,
            complete_async(|s: &mut State| {
                Box::pin(async move {
                    let name = s.message().map(|m| m.user.name.clone()).unwrap_or_default();
                    s.reply([format!("Hello {name}!")]).await?;
                    Ok::<(), MiddlewareError>(())
                })
            }),
        );
        b.text(
            ping,
            complete_async(|s: &mut State| {
                Box::pin(async move {
                    s.respond(["pong"]).await?;
                    Ok::<(), MiddlewareError>(())
                })
            }),
        );
        b.direct(
            remember,
            complete_async(move |s: &mut State| {
                let memory = Arc::clone(&memory);
                Box::pin(async move { remember_note(&memory, s).await })
            }),
        );
        b.direct(
            recall,
            complete_async(move |s: &mut State| {
                let note = recall_memory.get("note");
                Box::pin(async move {
                    let text = match note.as_ref().and_then(|n| n.as_str()) {
                        Some(note) => format!("You said: {note}"),
                        None => "You haven't told me anything yet.".to_string(),
                    };
                    s.respond([text]).await?;
                    Ok::<(), MiddlewareError>(())
                })
            }),
        );
        b.direct(
            quiz,
            complete_async(move |s: &mut State| {
                let dialogues = dialogues.clone();
                Box::pin(async move { start_quiz(&dialogues, s).await })
            }),
        );
        b.catch_all(complete_async(|s: &mut State| {
            Box::pin(async move {
                s.respond(["Sorry, I didn't catch that."]).await?;
                Ok::<(), MiddlewareError>(())
            })
        }));
    });
    Ok(())
}

async fn remember_note(memory: &BotMemory, state: &mut State) -> Reaction {
    let note = state
        .last_match()
        .and_then(|m| m.result.condition("note"))
        .map(|n| n.trim().trim_start_matches("that ").to_string())
        .unwrap_or_default();
    if note.is_empty() {
        state.respond(["Remember what?"]).await?;
        return Ok(());
    }
    memory.set("note", json!(note));
    state.respond(["I'll remember that."]).await?;
    Ok(())
}

async fn start_quiz(dialogues: &DialogueController, state: &mut State) -> Reaction {
    let options = dialogues
        .default_options()
        .with_timeout_text("Time's up! The answer was 4.");
    let dialogue = dialogues.create_with(options, None);
    quiz_branches(&dialogue).map_err(|e| MiddlewareError::failed("quiz", e.to_string()))?;
    dialogues
        .engage(state, &dialogue)
        .await
        .map_err(|e| MiddlewareError::failed("quiz", e.to_string()))?;
    state.respond(["What is 2 + 2?"]).await?;
    Ok(())
}

/// Answer branches for the quiz's next turn. A wrong answer registers
/// them again so the question stays open.
fn quiz_branches(dialogue: &Arc<Dialogue>) -> reflex_branches::Result<()> {
    let answer = Pattern::regex(r"^\s*(4|four)\s*$")?;
    let right: Weak<Dialogue> = Arc::downgrade(dialogue);
    let wrong: Weak<Dialogue> = Arc::downgrade(dialogue);
    dialogue.branches(|b| {
        b.text(
            answer,
            complete_async(move |s: &mut State| {
                let dialogue = right.upgrade();
                Box::pin(async move {
                    s.respond(["Correct!"]).await?;
                    if let Some(dialogue) = dialogue {
                        dialogue
                            .close()
                            .await
                            .map_err(|e| MiddlewareError::failed("quiz", e.to_string()))?;
                    }
                    Ok::<(), MiddlewareError>(())
                })
            }),
        );
        b.catch_all(complete_async(move |s: &mut State| {
            let dialogue = wrong.upgrade();
            Box::pin(async move {
                if let Some(dialogue) = dialogue {
                    quiz_branches(&dialogue)
                        .map_err(|e| MiddlewareError::failed("quiz", e.to_string()))?;
                }
                s.respond(["Not quite, try again."]).await?;
                Ok::<(), MiddlewareError>(())
            })
        }));
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use reflex_adapters::{Adapter, Adapters, MessageAdapter};
    use reflex_core::{Envelope, Message, Room, Settings, User};
    use serde_json::Value;

    use super::*;

    #[derive(Default)]
    struct Transcript(Mutex<Vec<String>>);

    #[async_trait]
    impl Adapter for Transcript {
        fn name(&self) -> &str {
            "transcript"
        }
    }

    #[async_trait]
    impl MessageAdapter for Transcript {
        async fn dispatch(&self, envelope: &Envelope) -> reflex_adapters::Result<Value> {
            self.0.lock().unwrap().extend(envelope.strings.iter().cloned());
            Ok(Value::Null)
        }
    }

    fn setup() -> (Arc<Runtime>, Arc<Transcript>) {
        let transcript = Arc::new(Transcript::default());
        let runtime = Runtime::new(
            Settings::default(),
            Adapters::new().with_message(transcript.clone()),
        );
        install(&runtime).unwrap();
        (runtime, transcript)
    }

    fn say(text: &str) -> Message {
        Message::text(User::new("u1", "alice").in_room(Room::new("shell")), text)
    }

    fn last(transcript: &Transcript) -> String {
        transcript.0.lock().unwrap().last().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn greets_by_name_only_when_addressed() {
        let (runtime, transcript) = setup();
        runtime.receive(say("bot hello")).await.unwrap();
        assert_eq!(last(&transcript), "Hello alice!");

        runtime.receive(say("hello")).await.unwrap();
        assert_eq!(last(&transcript), "Sorry, I didn't catch that.");
    }

    #[tokio::test]
    async fn remembers_and_recalls_a_note() {
        let (runtime, transcript) = setup();
        runtime
            .receive(say("bot remember that tea is ready"))
            .await
            .unwrap();
        assert_eq!(last(&transcript), "I'll remember that.");
        assert_eq!(runtime.memory().get("note"), Some(json!("tea is ready")));

        runtime.receive(say("bot what did i say?")).await.unwrap();
        assert_eq!(last(&transcript), "You said: tea is ready");
    }

    #[tokio::test]
    async fn quiz_keeps_asking_until_answered() {
        let (runtime, transcript) = setup();
        runtime.receive(say("bot quiz")).await.unwrap();
        assert_eq!(last(&transcript), "What is 2 + 2?");
        assert_eq!(runtime.dialogues().len(), 1);

        runtime.receive(say("5")).await.unwrap();
        assert_eq!(last(&transcript), "Not quite, try again.");
        runtime.receive(say("3")).await.unwrap();
        assert_eq!(last(&transcript), "Not quite, try again.");

        runtime.receive(say("four")).await.unwrap();
        assert_eq!(last(&transcript), "Correct!");
        assert!(runtime.dialogues().is_empty());

        runtime.receive(say("ping")).await.unwrap();
        assert_eq!(last(&transcript), "pong");
    }
}
