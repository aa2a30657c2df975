//! End-to-end behaviour of the engine against in-memory relays.

mod common;

use common::*;
use nostr_core::{MentionMode, Tag, KIND_TEXT_NOTE};
use quotefeed::engine::{Engine, FeedOrder, Settings};
use quotefeed::relay::RelayClient;
use quotefeed::Notification;
use std::sync::Arc;
use std::time::Duration;

fn settings(relays: &[Arc<MockRelay>]) -> Settings {
    let urls = relays.iter().map(|r| r.url().to_string()).collect();
    let mut settings = Settings::new(urls, TRACKED);
    settings.connect_timeout = Duration::from_millis(300);
    settings
}

async fn started(settings: Settings, relays: &[Arc<MockRelay>]) -> Arc<Engine> {
    let engine = Engine::new(settings, MockConnector::new(relays), Arc::new(TestCodec));
    engine.start().await;
    let expected = relays.len();
    wait_until("relays to subscribe", || {
        relays.iter().filter(|r| r.live_subscriptions() == 1).count() == expected
    })
    .await;
    engine
}

#[tokio::test]
async fn quote_and_its_target_form_one_entry() {
    let relay = MockRelay::new("wss://one.example");
    relay.add(note("quoted00001", "bob", 50, "the original words"));
    relay.add(metadata("bob", 10, r#"{"name":"bob"}"#));
    let engine = started(settings(&[relay.clone()]), &[relay.clone()]).await;

    relay.deliver(quote("quote000001", 100, "quoted00001", "so true")).await;
    wait_until("quoted note stored", || engine.store().len() == 2).await;
    wait_until("bob's profile", || engine.profiles().get("bob").is_some()).await;
    settle().await;

    assert_eq!(engine.feed().top_level_ids(), vec!["quote000001"]);
    assert_eq!(engine.feed().children("quote000001"), vec!["quoted00001"]);
    assert_eq!(relay.id_queries("quoted00001"), 1);
    // The quoted note references nothing, so nothing else is fetched.
    assert_eq!(relay.note_queries(), 1);

    let view = engine.view();
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].preview, "so true");
    assert_eq!(view.items[0].children.len(), 1);
    assert_eq!(view.items[0].children[0].author_label, "bob");
    assert_eq!(view.item_count(), 2);

    engine.stop().await;
}

#[tokio::test]
async fn same_quote_from_two_relays_is_processed_once() {
    let r1 = MockRelay::new("wss://one.example");
    let r2 = MockRelay::new("wss://two.example");
    for relay in [&r1, &r2] {
        relay.add(
            note("quoted00001", "bob", 50, "original").with_tag(Tag::mention("nested00001", HINT)),
        );
        relay.add(note("nested00001", "carol", 40, "deepest"));
    }
    let relays = [r1.clone(), r2.clone()];
    let engine = started(settings(&relays), &relays).await;

    let a = quote("quote000001", 100, "quoted00001", "look");
    r1.deliver(a.clone()).await;
    r2.deliver(a).await;
    wait_until("nested note stored", || engine.store().len() == 3).await;
    settle().await;

    assert_eq!(engine.feed().top_level_ids(), vec!["quote000001"]);
    assert_eq!(engine.feed().children("quote000001"), vec!["quoted00001"]);
    assert_eq!(engine.feed().children("quoted00001"), vec!["nested00001"]);
    for relay in &relays {
        assert_eq!(relay.id_queries("quoted00001"), 1);
        // Both relays answer for the quoted note, but only the first copy recurses.
        assert_eq!(relay.id_queries("nested00001"), 1);
        assert_eq!(relay.profile_queries("bob"), 1);
        assert_eq!(relay.profile_queries("carol"), 1);
        assert_eq!(relay.profile_queries(TRACKED), 1);
        assert_eq!(relay.note_queries(), 2);
    }

    engine.stop().await;
}

#[tokio::test]
async fn quote_cycle_stops_after_one_hop_each_way() {
    let relay = MockRelay::new("wss://one.example");
    relay.add(note("quotedaaaaa", "bob", 50, "a").with_tag(Tag::mention("quotedbbbbb", HINT)));
    relay.add(note("quotedbbbbb", "carol", 40, "b").with_tag(Tag::mention("quotedaaaaa", HINT)));
    let engine = started(settings(&[relay.clone()]), &[relay.clone()]).await;

    relay.deliver(quote("quote000001", 100, "quotedaaaaa", "")).await;
    wait_until("cycle stored", || engine.store().len() == 3).await;
    wait_until("cycle closed", || {
        engine.feed().children("quotedbbbbb") == vec!["quotedaaaaa"]
    })
    .await;
    settle().await;

    assert_eq!(relay.id_queries("quotedaaaaa"), 1);
    assert_eq!(relay.id_queries("quotedbbbbb"), 1);
    assert_eq!(relay.note_queries(), 2);
    assert_eq!(engine.feed().children("quotedaaaaa"), vec!["quotedbbbbb"]);

    // quote -> a -> b, with the edge back to a rendered once.
    assert_eq!(engine.view().item_count(), 3);

    engine.stop().await;
}

#[tokio::test]
async fn shared_quote_fills_every_child_slot() {
    let relay = MockRelay::new("wss://one.example");
    relay.add(note("quoted00001", "bob", 50, "shared"));
    let engine = started(settings(&[relay.clone()]), &[relay.clone()]).await;

    relay.deliver(quote("quote000001", 100, "quoted00001", "first")).await;
    wait_until("quoted note stored", || engine.store().len() == 2).await;
    relay.deliver(quote("quote000002", 101, "quoted00001", "second")).await;
    wait_until("second quote attached", || {
        engine.feed().children("quote000002") == vec!["quoted00001"]
    })
    .await;
    settle().await;

    assert_eq!(engine.feed().children("quote000001"), vec!["quoted00001"]);
    // The second quote reuses the stored note instead of querying again.
    assert_eq!(relay.id_queries("quoted00001"), 1);
    assert_eq!(engine.store().len(), 3);

    let view = engine.view();
    assert_eq!(view.items.len(), 2);
    assert!(view.items.iter().all(|i| i.children.len() == 1));
    assert!(view.items.iter().all(|i| i.children[0].preview == "shared"));

    engine.stop().await;
}

#[tokio::test]
async fn inline_reference_matching_the_mention_is_not_fetched_twice() {
    let relay = MockRelay::new("wss://one.example");
    relay.add(note("quoted00001", "bob", 50, "original"));
    let engine = started(settings(&[relay.clone()]), &[relay.clone()]).await;

    let content = format!("quoting {}", inline_ref("quoted00001"));
    relay.deliver(quote("quote000001", 100, "quoted00001", &content)).await;
    wait_until("quoted note stored", || engine.store().len() == 2).await;
    settle().await;

    assert_eq!(relay.id_queries("quoted00001"), 1);
    assert_eq!(engine.view().items[0].preview, "quoting");

    engine.stop().await;
}

#[tokio::test]
async fn undecodable_reference_is_dropped_quietly() {
    let relay = MockRelay::new("wss://one.example");
    let engine = started(settings(&[relay.clone()]), &[relay.clone()]).await;

    let content = format!("hey {}", inline_ref("badbadbadbad"));
    relay.deliver(quote("quote000001", 100, "quoted00001", &content)).await;
    wait_until("quote stored", || engine.store().len() == 1).await;
    settle().await;

    // Only the tag-mention is queried.
    assert_eq!(relay.note_queries(), 1);
    assert_eq!(relay.id_queries("badbadbadbad"), 0);
    assert_eq!(engine.view().items[0].preview, "hey");

    engine.stop().await;
}

#[tokio::test]
async fn inline_references_resolve_recursively() {
    let relay = MockRelay::new("wss://one.example");
    let nested = format!("see {}", inline_ref("nested00001"));
    relay.add(note("quoted00001", "bob", 50, &nested));
    relay.add(note("nested00001", "carol", 40, "deepest"));
    let engine = started(settings(&[relay.clone()]), &[relay.clone()]).await;

    relay.deliver(quote("quote000001", 100, "quoted00001", "")).await;
    wait_until("nested note stored", || engine.store().len() == 3).await;

    assert_eq!(engine.feed().children("quoted00001"), vec!["nested00001"]);
    let view = engine.view();
    assert_eq!(view.items[0].children[0].children[0].preview, "deepest");
    assert_eq!(view.items[0].children[0].preview, "see");

    engine.stop().await;
}

#[tokio::test]
async fn max_depth_stops_resolution() {
    let relay = MockRelay::new("wss://one.example");
    relay.add(note("quoted00001", "bob", 50, "").with_tag(Tag::mention("nested00001", HINT)));
    relay.add(note("nested00001", "carol", 40, "deepest"));
    let mut settings = settings(&[relay.clone()]);
    settings.max_depth = Some(1);
    let engine = started(settings, &[relay.clone()]).await;

    relay.deliver(quote("quote000001", 100, "quoted00001", "")).await;
    wait_until("quoted note stored", || engine.store().len() == 2).await;
    settle().await;

    assert_eq!(relay.id_queries("nested00001"), 0);
    assert!(!engine.store().has("nested00001"));

    engine.stop().await;
}

#[tokio::test]
async fn profile_is_fetched_once_per_author() {
    let relay = MockRelay::new("wss://one.example");
    relay.add(metadata(TRACKED, 10, r#"{"display_name":"Tracked"}"#));
    let engine = started(settings(&[relay.clone()]), &[relay.clone()]).await;
    let mut notifications = engine.notifications();

    relay.deliver(quote("quote000001", 100, "quoted00001", "")).await;
    relay.deliver(quote("quote000002", 101, "quoted00002", "")).await;
    wait_until("both quotes stored", || engine.store().len() == 2).await;
    wait_until("profile resolved", || engine.profiles().get(TRACKED).is_some()).await;

    assert_eq!(relay.profile_queries(TRACKED), 1);
    assert_eq!(engine.profiles().display_label(TRACKED), "Tracked");

    let mut saw_profile = false;
    while let Ok(notification) = notifications.try_recv() {
        if notification == Notification::ProfileResolved(TRACKED.to_string()) {
            saw_profile = true;
        }
    }
    assert!(saw_profile);

    engine.stop().await;
}

#[tokio::test]
async fn unparseable_profile_becomes_unknown_user() {
    let relay = MockRelay::new("wss://one.example");
    relay.add(metadata(TRACKED, 10, "{not json"));
    let engine = started(settings(&[relay.clone()]), &[relay.clone()]).await;

    relay.deliver(quote("quote000001", 100, "quoted00001", "")).await;
    wait_until("profile stored", || engine.profiles().get(TRACKED).is_some()).await;

    assert!(engine.profiles().get(TRACKED).unwrap().placeholder);
    assert_eq!(engine.view().items[0].author_label, "Unknown User");

    engine.stop().await;
}

#[tokio::test]
async fn repost_time_puts_newest_first() {
    let relay = MockRelay::new("wss://one.example");
    let mut settings = settings(&[relay.clone()]);
    settings.feed_order = FeedOrder::RepostTime;
    let engine = started(settings, &[relay.clone()]).await;

    relay.deliver(quote("quoteaaaaaa", 100, "quoted00001", "")).await;
    relay.deliver(quote("quotebbbbbb", 200, "quoted00002", "")).await;
    wait_until("both stored", || engine.store().len() == 2).await;

    assert_eq!(engine.feed().top_level_ids(), vec!["quotebbbbbb", "quoteaaaaaa"]);

    engine.stop().await;
}

#[tokio::test]
async fn displayed_feed_is_capped_but_store_keeps_everything() {
    let relay = MockRelay::new("wss://one.example");
    let mut settings = settings(&[relay.clone()]);
    settings.max_displayed = 2;
    let engine = started(settings, &[relay.clone()]).await;

    for (i, id) in ["quote000001", "quote000002", "quote000003"].iter().enumerate() {
        relay.deliver(quote(id, 100 + i as u64, "quoted00001", "")).await;
    }
    wait_until("all stored", || engine.store().len() == 3).await;

    assert_eq!(engine.feed().top_level_ids(), vec!["quote000002", "quote000003"]);
    assert!(engine.store().has("quote000001"));

    engine.stop().await;
}

#[tokio::test]
async fn non_qualifying_events_are_ignored() {
    let relay = MockRelay::new("wss://one.example");
    let engine = started(settings(&[relay.clone()]), &[relay.clone()]).await;

    // plain post, reply, someone else's quote, wrong kind
    relay.deliver(note("plain000001", TRACKED, 1, "hello")).await;
    relay
        .deliver(note("reply000001", TRACKED, 2, "re").with_tag(Tag::event("quoted00001")))
        .await;
    relay
        .deliver(note("other000001", "bob", 3, "").with_tag(Tag::mention("quoted00001", HINT)))
        .await;
    let mut wrong_kind = quote("kind0000001", 4, "quoted00001", "");
    wrong_kind.kind = KIND_TEXT_NOTE + 5;
    relay.deliver(wrong_kind).await;
    settle().await;

    assert_eq!(engine.store().len(), 0);
    assert_eq!(relay.note_queries(), 0);

    engine.stop().await;
}

#[tokio::test]
async fn strict_mode_requires_relay_hint() {
    let relay = MockRelay::new("wss://one.example");
    let mut settings = settings(&[relay.clone()]);
    settings.mention_mode = MentionMode::Strict;
    let engine = started(settings, &[relay.clone()]).await;

    relay
        .deliver(note("quote000001", TRACKED, 1, "").with_tag(Tag::mention("quoted00001", "")))
        .await;
    relay.deliver(quote("quote000002", 2, "quoted00002", "")).await;
    wait_until("valid quote stored", || engine.store().len() == 1).await;
    settle().await;

    assert!(engine.store().has("quote000002"));
    assert!(!engine.store().has("quote000001"));

    engine.stop().await;
}

#[tokio::test]
async fn stored_history_arrives_through_primary_subscription() {
    let relay = MockRelay::new("wss://one.example");
    relay.add(quote("quote000001", 100, "quoted00001", "from history"));
    relay.add(note("quoted00001", "bob", 50, "original"));
    let engine = started(settings(&[relay.clone()]), &[relay.clone()]).await;

    wait_until("history resolved", || engine.store().len() == 2).await;
    assert_eq!(engine.feed().top_level_ids(), vec!["quote000001"]);

    let (filter, _) = relay.requests()[0].clone();
    assert_eq!(filter.authors, vec![TRACKED.to_string()]);
    assert_eq!(filter.kinds, vec![KIND_TEXT_NOTE]);
    assert_eq!(filter.limit, Some(50));

    engine.stop().await;
}

#[tokio::test]
async fn stop_closes_relays_and_ignores_late_events() {
    let relay = MockRelay::new("wss://one.example");
    let engine = started(settings(&[relay.clone()]), &[relay.clone()]).await;

    engine.stop().await;
    assert!(relay.is_closed());
    assert_eq!(engine.connected_relays(), 0);

    relay.deliver(quote("quote000001", 100, "quoted00001", "")).await;
    settle().await;
    assert_eq!(engine.store().len(), 0);
}
