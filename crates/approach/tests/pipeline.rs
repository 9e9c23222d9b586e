//! End-to-end pipeline tests against the in-memory index.
//!
//! The provider is scripted; retrieval runs for real through
//! `InMemoryIndex`, so filters, modes and ranking are exercised together.

use std::sync::Arc;

use futures::TryStreamExt;
use groundchat_approach::test_helpers::{ScriptedProvider, text_response, tool_call_response};
use groundchat_approach::{
    ApproachSettings, AuthClaims, ChatReadRetrieveRead, ChatStreamEvent, Overrides, RetrievalMode,
};
use groundchat_core::message::Message;
use groundchat_search::{IndexedDocument, InMemoryIndex};

async fn index() -> Arc<InMemoryIndex> {
    let index = InMemoryIndex::new();
    index
        .add_all([
            IndexedDocument::new("Benefit_Options-2.pdf", "Northwind Plus covers cardio\nand dental care.")
                .with_category("benefits")
                .with_oid("abc")
                .with_groups(["g1"])
                .with_embedding(vec![0.0, 0.0, 1.0]),
            IndexedDocument::new("Northwind_Standard-5.pdf", "Northwind Standard covers cardio rehab only.")
                .with_category("benefits")
                .with_oid("xyz")
                .with_groups(["g2"])
                .with_embedding(vec![0.0, 1.0, 0.0]),
            IndexedDocument::new("employee_handbook-3.pdf", "Cardio room opens at 6am.")
                .with_category("handbook")
                .with_groups(["g3"])
                .with_embedding(vec![1.0, 0.0, 0.0]),
        ])
        .await;
    Arc::new(index)
}

fn search_call(query: &str) -> groundchat_core::provider::ProviderResponse {
    tool_call_response("search_sources", &format!(r#"{{"search_query":"{query}"}}"#))
}

fn history() -> Vec<Message> {
    vec![
        Message::user("What are my health plans?"),
        Message::assistant("You can pick Northwind Plus or Northwind Standard [Benefit_Options-2.pdf]."),
        Message::user("Do they cover cardio?"),
    ]
}

#[tokio::test]
async fn blocking_answer_with_citations_and_followups() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        search_call("cardio"),
        text_response("Both plans cover cardio [Benefit_Options-2.pdf].<<What about dental?>><<Is rehab covered?>>"),
    ]));
    let overrides = Overrides {
        retrieval_mode: RetrievalMode::Text,
        suggest_followup_questions: true,
        ..Overrides::default()
    };

    let approach = ChatReadRetrieveRead::new(provider.clone(), index().await, ApproachSettings::default());
    let response = approach.run(&history(), &overrides, &AuthClaims::default()).await.unwrap();

    assert_eq!(response.message.content, "Both plans cover cardio [Benefit_Options-2.pdf].");
    assert_eq!(response.extra.followup_questions, vec!["What about dental?", "Is rehab covered?"]);
    assert_eq!(response.extra.data_points.len(), 3);
    assert!(response
        .extra
        .data_points
        .contains(&"Benefit_Options-2.pdf: Northwind Plus covers cardio . and dental care.".to_string()));

    let answer = &provider.requests()[1];
    assert!(answer.messages[0].content.contains("double angle brackets"));
    // system, two earlier turns, question with sources
    assert_eq!(answer.messages.len(), 4);
    assert!(answer.messages[3].content.starts_with("Do they cover cardio?\n\nSources:\n"));
}

#[tokio::test]
async fn owner_filter_limits_sources() {
    let provider = Arc::new(ScriptedProvider::new(vec![search_call("cardio"), text_response("ok")]));
    let overrides = Overrides {
        retrieval_mode: RetrievalMode::Text,
        use_oid_security_filter: true,
        ..Overrides::default()
    };
    let claims = AuthClaims { oid: Some("abc".into()), groups: vec![] };

    let approach = ChatReadRetrieveRead::new(provider, index().await, ApproachSettings::default());
    let response = approach.run(&history(), &overrides, &claims).await.unwrap();

    assert_eq!(response.extra.data_points.len(), 1);
    assert!(response.extra.data_points[0].starts_with("Benefit_Options-2.pdf: "));
}

#[tokio::test]
async fn group_filter_with_category() {
    let provider = Arc::new(ScriptedProvider::new(vec![search_call("cardio"), text_response("ok")]));
    let overrides = Overrides {
        retrieval_mode: RetrievalMode::Text,
        use_groups_security_filter: true,
        selected_category: Some("benefits".into()),
        ..Overrides::default()
    };
    let claims = AuthClaims { oid: None, groups: vec!["g2".into(), "g3".into()] };

    let approach = ChatReadRetrieveRead::new(provider, index().await, ApproachSettings::default());
    let response = approach.run(&history(), &overrides, &claims).await.unwrap();

    // g3's document is in the handbook category
    assert_eq!(response.extra.data_points.len(), 1);
    assert!(response.extra.data_points[0].starts_with("Northwind_Standard-5.pdf: "));
}

#[tokio::test]
async fn vectors_mode_searches_by_embedding_only() {
    let provider = Arc::new(
        ScriptedProvider::new(vec![search_call("cardio"), text_response("ok")]).with_embedding(vec![1.0, 0.0, 0.0]),
    );
    let overrides = Overrides {
        retrieval_mode: RetrievalMode::Vectors,
        top: 1,
        ..Overrides::default()
    };

    let approach = ChatReadRetrieveRead::new(provider.clone(), index().await, ApproachSettings::default());
    let response = approach.run(&history(), &overrides, &AuthClaims::default()).await.unwrap();

    assert_eq!(provider.embed_requests().len(), 1);
    assert_eq!(response.extra.data_points, vec!["employee_handbook-3.pdf: Cardio room opens at 6am."]);
}

#[tokio::test]
async fn thanks_is_searched_verbatim() {
    let provider = Arc::new(ScriptedProvider::new(vec![text_response("0"), text_response("You're welcome!")]));
    let overrides = Overrides { retrieval_mode: RetrievalMode::Text, ..Overrides::default() };
    let mut conversation = history();
    conversation.push(Message::assistant("Yes, both do."));
    conversation.push(Message::user("thanks"));

    let approach = ChatReadRetrieveRead::new(provider, index().await, ApproachSettings::default());
    let response = approach.run(&conversation, &overrides, &AuthClaims::default()).await.unwrap();

    assert!(response.extra.thoughts.starts_with("Searched for:<br>thanks<br>"));
    assert!(response.extra.data_points.is_empty());
    assert_eq!(response.message.content, "You're welcome!");
}

#[tokio::test]
async fn streaming_and_blocking_agree() {
    let answer = "Here is the answer.<<What else?>><<Another one?>>";

    let blocking = ChatReadRetrieveRead::new(
        Arc::new(ScriptedProvider::new(vec![search_call("cardio"), text_response(answer)])),
        index().await,
        ApproachSettings::default(),
    )
    .run(&history(), &Overrides::default(), &AuthClaims::default())
    .await
    .unwrap();

    let streaming = ChatReadRetrieveRead::new(
        Arc::new(
            ScriptedProvider::new(vec![search_call("cardio")])
                .with_stream(vec!["Here is the", " answer.<", "<What else?>", "><<Another one?>>"]),
        ),
        index().await,
        ApproachSettings::default(),
    );
    let events: Vec<ChatStreamEvent> = streaming
        .run_stream(&history(), &Overrides::default(), &AuthClaims::default())
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();

    let visible: String = events
        .iter()
        .filter_map(|e| match e {
            ChatStreamEvent::ContentDelta { content } => Some(content.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(visible, blocking.message.content);

    let followups = events
        .iter()
        .find_map(|e| match e {
            ChatStreamEvent::FollowupMetadata { questions } => Some(questions.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(followups, blocking.extra.followup_questions);

    match &events[0] {
        ChatStreamEvent::Context { data_points, .. } => assert_eq!(data_points, &blocking.extra.data_points),
        other => panic!("expected context first, got {other:?}"),
    }
}

#[tokio::test]
async fn answer_stream_without_marker_ends_with_empty_done() {
    let approach = ChatReadRetrieveRead::new(
        Arc::new(ScriptedProvider::new(vec![search_call("cardio")]).with_stream(vec!["Plain ", "answer."])),
        index().await,
        ApproachSettings::default(),
    );
    let events: Vec<ChatStreamEvent> = approach
        .run_stream(&history(), &Overrides::default(), &AuthClaims::default())
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();

    assert!(!events.iter().any(|e| matches!(e, ChatStreamEvent::FollowupMetadata { .. })));
    match events.last().unwrap() {
        ChatStreamEvent::Done { followup_questions, .. } => assert!(followup_questions.is_empty()),
        other => panic!("expected done, got {other:?}"),
    }
}

#[tokio::test]
async fn semantic_captions_replace_passage_content() {
    let index = InMemoryIndex::new();
    index
        .add(
            IndexedDocument::new("Benefit_Options-4.pdf", "Dental is covered at 80%. Vision exams are extra.")
                .with_embedding(vec![0.0, 0.0, 1.0]),
        )
        .await;

    let provider = Arc::new(ScriptedProvider::new(vec![search_call("vision"), text_response("ok")]));
    let overrides = Overrides {
        semantic_ranker: true,
        semantic_captions: true,
        ..Overrides::default()
    };

    let approach = ChatReadRetrieveRead::new(provider.clone(), Arc::new(index), ApproachSettings::default());
    let response = approach
        .run(&[Message::user("Is vision covered?")], &overrides, &AuthClaims::default())
        .await
        .unwrap();

    assert_eq!(response.extra.data_points, vec!["Benefit_Options-4.pdf: Vision exams are extra."]);
    // semantic queries carry no vector clause
    assert!(provider.embed_requests().is_empty());
    let answer = &provider.requests()[1];
    assert!(answer.messages.last().unwrap().content.ends_with("Benefit_Options-4.pdf: Vision exams are extra."));
}

#[tokio::test]
async fn prompt_options_reach_the_answer_system_message() {
    let provider = Arc::new(
        ScriptedProvider::new(vec![search_call("cardio")]).with_stream(vec!["Yes.<<Dental?>>"]),
    );
    let overrides = Overrides {
        suggest_followup_questions: true,
        prompt_template: Some(">>>Answer in French.".into()),
        ..Overrides::default()
    };

    let approach = ChatReadRetrieveRead::new(provider.clone(), index().await, ApproachSettings::default());
    let events: Vec<ChatStreamEvent> = approach
        .run_stream(&history(), &overrides, &AuthClaims::default())
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert!(events.contains(&ChatStreamEvent::FollowupMetadata { questions: vec!["Dental?".into()] }));

    let system = &provider.requests()[1].messages[0].content;
    assert!(system.starts_with("You are an AI Assistant."));
    assert!(system.contains("Answer in French.\n"));
    assert!(system.contains("double angle brackets"));
}

#[tokio::test]
async fn replacement_template_without_followups() {
    let provider = Arc::new(ScriptedProvider::new(vec![search_call("cardio"), text_response("Short.")]));
    let overrides = Overrides {
        prompt_template: Some("Answer in one sentence.{follow_up_questions_prompt}".into()),
        ..Overrides::default()
    };

    let approach = ChatReadRetrieveRead::new(provider.clone(), index().await, ApproachSettings::default());
    approach.run(&history(), &overrides, &AuthClaims::default()).await.unwrap();

    assert_eq!(provider.requests()[1].messages[0].content, "Answer in one sentence.");
}
