// Dialogues driven through a runtime: engagement, replacement, timeouts.

mod common;

use std::sync::Arc;

use reflex_branches::Pattern;
use reflex_core::State;
use reflex_dialogue::Audience;
use reflex_middleware::{complete_fn, Noop};
use serde_json::json;
use tokio::time::{sleep, Duration};

use common::{alice, bob, harness, said};

#[tokio::test]
async fn second_dialogue_replaces_first_for_same_audience() {
    let h = harness();
    let dialogues = h.runtime.dialogues();

    let first = dialogues.create();
    first.branches(|b| b.text(Pattern::regex("first").unwrap(), Noop));
    let mut opener = State::new(said(alice(), "start"));
    dialogues.engage(&mut opener, &first).await.unwrap();
    assert!(first.clock_running());

    let second = dialogues.create();
    second.branches(|b| b.text(Pattern::regex("second").unwrap(), Noop));
    let mut opener = State::new(said(alice(), "again"));
    dialogues.engage(&mut opener, &second).await.unwrap();

    assert_eq!(dialogues.len(), 1);
    assert!(!first.is_open());
    assert!(!first.clock_running());
    let engaged = dialogues.engaged(&opener).unwrap();
    assert_eq!(engaged.id, second.id);

    assert!(!h.runtime.receive(said(alice(), "first")).await.unwrap().matched());
    assert!(h.runtime.receive(said(alice(), "second")).await.unwrap().matched());
    second.close().await.unwrap();
}

#[tokio::test]
async fn direct_dialogue_does_not_capture_other_users() {
    let h = harness();
    h.runtime.branches(|b| b.text(Pattern::regex("hi").unwrap(), Noop));

    let dialogue = h.runtime.dialogues().create();
    dialogue.branches(|b| b.text(Pattern::regex("secret").unwrap(), Noop));
    let mut opener = State::new(said(alice(), "start"));
    h.runtime.dialogues().engage(&mut opener, &dialogue).await.unwrap();

    let state = h.runtime.receive(said(bob(), "hi")).await.unwrap();
    assert!(state.matched());
    assert!(state.dialogue.is_none());

    let state = h.runtime.receive(said(alice(), "hi")).await.unwrap();
    assert!(!state.matched());
    dialogue.close().await.unwrap();
}

#[tokio::test]
async fn room_dialogue_answers_anyone_in_the_room() {
    let h = harness();
    let dialogues = h.runtime.dialogues();
    let options = dialogues.default_options().with_audience(Audience::Room);
    let dialogue = dialogues.create_with(options, None);
    dialogue.branches(|b| {
        b.text(
            Pattern::regex("vote").unwrap(),
            complete_fn(|s: &mut State| {
                s.set_extension("voted", json!(true));
                Ok(())
            }),
        )
    });
    let mut opener = State::new(said(alice(), "poll"));
    dialogues.engage(&mut opener, &dialogue).await.unwrap();

    let state = h.runtime.receive(said(bob(), "vote")).await.unwrap();
    assert!(state.matched());
    assert_eq!(state.dialogue.as_ref().unwrap().id, dialogue.id);
    dialogue.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn expired_dialogue_sends_timeout_text_and_closes() {
    let h = harness();
    let dialogues = h.runtime.dialogues();
    let options = dialogues
        .default_options()
        .with_timeout(100)
        .with_timeout_text("Too slow!");
    let dialogue = dialogues.create_with(options, None);
    dialogue.branches(|b| b.text(Pattern::regex("answer").unwrap(), Noop));
    let mut opener = State::new(said(alice(), "quiz"));
    dialogues.engage(&mut opener, &dialogue).await.unwrap();

    sleep(Duration::from_millis(99)).await;
    assert!(h.recorder.sent().is_empty());

    sleep(Duration::from_millis(5)).await;
    assert_eq!(h.recorder.texts(), vec!["Too slow!"]);
    assert!(!dialogue.is_open());
    assert!(dialogues.is_empty());

    let sent = h.recorder.sent();
    assert_eq!(sent[0].user.as_ref().map(|u| u.id.as_str()), Some("u1"));
}

#[tokio::test(start_paused = true)]
async fn activity_restarts_the_countdown() {
    let h = harness();
    let dialogues = h.runtime.dialogues();
    let options = dialogues.default_options().with_timeout(100);
    let dialogue = dialogues.create_with(options, None);
    let keep = Arc::clone(&dialogue);
    dialogue.branches(|b| {
        b.text(
            Pattern::regex("more").unwrap(),
            complete_fn(move |_s: &mut State| {
                keep.branches(|b| b.text(Pattern::regex("more").unwrap(), Noop));
                Ok(())
            }),
        )
    });
    let mut opener = State::new(said(alice(), "begin"));
    dialogues.engage(&mut opener, &dialogue).await.unwrap();

    sleep(Duration::from_millis(80)).await;
    assert!(h.runtime.receive(said(alice(), "more")).await.unwrap().matched());
    sleep(Duration::from_millis(80)).await;
    assert!(dialogue.is_open());
    assert!(h.recorder.sent().is_empty());

    sleep(Duration::from_millis(30)).await;
    assert!(!dialogue.is_open());
    assert_eq!(h.recorder.sent().len(), 1);
}
