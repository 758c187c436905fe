use serde_json::json;
use tokenator_sdk::testing::{SharedRelay, identity_of, memory_party};
use tokenator_sdk::{
    Counterparty, Error, ErrorKind, KeyPath, OutPoint, Signer, TagFilter, Token, pushdrop,
};

fn tags(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Message body of `token` with its custody metadata rewritten by `edit`.
fn tampered_body(token: &Token, edit: impl FnOnce(&mut serde_json::Value)) -> String {
    let mut body = serde_json::to_value(&token.body).unwrap();
    let text = body["transaction"]["outputs"][0]["customInstructions"]
        .as_str()
        .unwrap()
        .to_string();
    let mut meta: serde_json::Value = serde_json::from_str(&text).unwrap();
    edit(&mut meta);
    body["transaction"]["outputs"][0]["customInstructions"] = json!(meta.to_string());
    body.to_string()
}

#[tokio::test]
async fn self_send_roundtrip() {
    let relay = SharedRelay::new();
    let alice = memory_party(&relay);

    let (token, receipt) = alice
        .send_token(json!({ "task": "buy milk" }), None, tags(&["groceries"]))
        .await
        .unwrap();
    assert_eq!(token.recipient, Counterparty::Myself);
    assert_eq!(token.body.amount, Some(1));
    assert!(!receipt.message_id.is_empty());

    let report = alice.receive_tokens().await.unwrap();
    assert_eq!(report.accepted.len(), 1);
    assert!(report.rejected.is_empty());
    assert_eq!(relay.ack_calls(), vec![vec![receipt.message_id.clone()]]);

    // Creation already filed the output; acceptance must not duplicate it.
    let held = alice.list_tokens(None).await.unwrap();
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].txid, token.txid());
    assert_eq!(held[0].tags, tags(&["groceries"]));
    assert!(held[0].envelope.is_some());
    let meta = held[0].custom_instructions.as_ref().unwrap();
    assert_eq!(meta.sender, identity_of(&alice));
    assert_eq!(meta.protocol_id, "todo list");

    let payload = alice.decrypt_payload(&held[0]).await.unwrap();
    assert_eq!(payload, json!({ "task": "buy milk", "recipient": "self" }));

    alice.redeem(&held[0], None).await.unwrap();
    assert!(alice.list_tokens(None).await.unwrap().is_empty());
    assert!(alice
        .ledger()
        .is_spent(&OutPoint::new(held[0].txid, held[0].vout)));
}

#[tokio::test]
async fn transfer_to_counterparty() {
    let relay = SharedRelay::new();
    let alice = memory_party(&relay);
    let bob = memory_party(&relay);
    let bob_id = identity_of(&bob);

    let (token, _) = alice
        .send_token(
            json!({ "task": "walk dog" }),
            Some(Counterparty::Other(bob_id)),
            Vec::new(),
        )
        .await
        .unwrap();

    // Sender keeps no custody of tokens addressed to others.
    assert!(alice.list_tokens(None).await.unwrap().is_empty());

    let report = bob.receive_tokens().await.unwrap();
    assert_eq!(report.accepted.len(), 1);
    assert_eq!(report.accepted[0].sender, identity_of(&alice));

    let submissions = bob.ledger().submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].note, "todo list token");
    assert_eq!(submissions[0].amount, 1);

    let held = bob.list_tokens(None).await.unwrap();
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].txid, token.txid());

    let payload = bob.decrypt_payload(&held[0]).await.unwrap();
    assert_eq!(payload["task"], "walk dog");
    assert_eq!(payload["recipient"], hex::encode(bob_id.serialize()));

    // The ledger checks the unlock against the locking key.
    bob.redeem(&held[0], Some("done".into())).await.unwrap();
    assert!(bob.list_tokens(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn payload_recipient_and_amount_are_honoured() {
    let relay = SharedRelay::new();
    let alice = memory_party(&relay);
    let bob = memory_party(&relay);
    let bob_id = identity_of(&bob);
    let bob_hex = hex::encode(bob_id.serialize());

    let (token, _) = alice
        .send_token(
            json!({ "recipient": bob_hex, "note": "x", "amount": 5 }),
            None,
            Vec::new(),
        )
        .await
        .unwrap();
    assert_eq!(token.recipient, Counterparty::Other(bob_id));
    assert_eq!(token.payload["recipient"], bob_hex);
    assert_eq!(token.body.amount, Some(5));
    assert!(alice.list_tokens(None).await.unwrap().is_empty());
    assert!(alice.receive().await.unwrap().is_empty());

    let report = bob.receive_tokens().await.unwrap();
    assert_eq!(report.accepted.len(), 1);
    let held = bob.list_tokens(None).await.unwrap();
    let payload = bob.decrypt_payload(&held[0]).await.unwrap();
    assert_eq!(payload["note"], "x");
    assert_eq!(payload["recipient"], bob_hex);

    let err = alice
        .create_token(
            json!({ "recipient": bob_hex }),
            Some(Counterparty::Myself),
            Vec::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Counterparty(_)));
}

#[tokio::test]
async fn locking_key_matches_recipient_derivation() {
    let relay = SharedRelay::new();
    let alice = memory_party(&relay);
    let bob = memory_party(&relay);

    let token = alice
        .create_token(
            json!({ "n": 1 }),
            Some(Counterparty::Other(identity_of(&bob))),
            Vec::new(),
        )
        .await
        .unwrap();
    let script = &token.body.transaction.raw_tx.output[0].script_pubkey;
    let decoded = pushdrop::decode(script).unwrap();

    let expected = bob
        .signer()
        .derive_public_key(
            &KeyPath::new("todo list", "1", Counterparty::Other(identity_of(&alice))),
            true,
        )
        .await
        .unwrap();
    assert_eq!(decoded.locking_public_key, expected);
    assert_eq!(decoded.fields[0], alice.config().protocol_address);
}

#[tokio::test]
async fn validator_rejects_tampered_metadata() {
    let relay = SharedRelay::new();
    let alice = memory_party(&relay);
    let bob = memory_party(&relay);
    let carol = memory_party(&relay);
    let to_bob = Some(Counterparty::Other(identity_of(&bob)));

    let token = alice
        .create_token(json!({ "n": 1 }), to_bob, Vec::new())
        .await
        .unwrap();
    bob.validate(&token.body).await.unwrap();

    let carol_hex = hex::encode(identity_of(&carol).serialize());
    let edits: Vec<Box<dyn FnOnce(&mut serde_json::Value)>> = vec![
        Box::new(move |m: &mut serde_json::Value| m["sender"] = json!(carol_hex)),
        Box::new(|m: &mut serde_json::Value| m["protocolID"] = json!("other protocol")),
        Box::new(|m: &mut serde_json::Value| m["keyID"] = json!("2")),
    ];
    for edit in edits {
        let body = serde_json::from_str(&tampered_body(&token, edit)).unwrap();
        let err = bob.validate(&body).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOwnerKey, "{err}");
    }

    let mut stripped = token.body.clone();
    stripped.transaction.outputs[0].custom_instructions = None;
    let err = bob.validate(&stripped).await.unwrap_err();
    assert!(matches!(err, Error::InvalidToken(_)));

    let mut empty = token.body.clone();
    empty.transaction.outputs.clear();
    assert!(matches!(
        bob.validate(&empty).await,
        Err(Error::InvalidToken(_))
    ));

    // Carol holds no key for the relationship.
    assert_eq!(
        carol.validate(&token.body).await.unwrap_err().kind(),
        ErrorKind::InvalidOwnerKey
    );
}

#[tokio::test]
async fn batch_isolates_failures_and_acknowledges_once() {
    let relay = SharedRelay::new();
    let alice = memory_party(&relay);
    let bob = memory_party(&relay);
    let alice_id = identity_of(&alice);
    let bob_id = identity_of(&bob);
    let to_bob = || Some(Counterparty::Other(bob_id));
    let inbox = bob.config().message_box.clone();

    let (_, first) = alice
        .send_token(json!({ "n": 1 }), to_bob(), Vec::new())
        .await
        .unwrap();
    let garbage = relay.inject(bob_id, &inbox, alice_id, "{\"transaction\":");
    let forged = alice
        .create_token(json!({ "n": 2 }), to_bob(), Vec::new())
        .await
        .unwrap();
    let forged_id = relay.inject(
        bob_id,
        &inbox,
        alice_id,
        &tampered_body(&forged, |m| m["keyID"] = json!("9")),
    );
    let (_, last) = alice
        .send_token(json!({ "n": 3 }), to_bob(), Vec::new())
        .await
        .unwrap();

    let report = bob.receive_tokens().await.unwrap();
    assert_eq!(
        report.accepted_ids(),
        vec![first.message_id.clone(), last.message_id.clone()]
    );
    let rejected: Vec<_> = report
        .rejected
        .iter()
        .map(|r| (r.message_id.clone(), r.error.kind()))
        .collect();
    assert_eq!(
        rejected,
        vec![
            (garbage.clone(), ErrorKind::Malformed),
            (forged_id.clone(), ErrorKind::InvalidOwnerKey),
        ]
    );

    // One acknowledgement, after the loop, with exactly the accepted ids.
    assert_eq!(
        relay.ack_calls(),
        vec![vec![first.message_id.clone(), last.message_id.clone()]]
    );
    assert!(!relay.is_acknowledged(&garbage));
    assert!(!relay.is_acknowledged(&forged_id));
    assert_eq!(bob.list_tokens(None).await.unwrap().len(), 2);

    // Rejected messages stay pending; nothing new to acknowledge.
    let again = bob.receive_tokens().await.unwrap();
    assert!(again.accepted.is_empty());
    assert_eq!(again.rejected.len(), 2);
    assert_eq!(relay.ack_calls().len(), 1);
}

#[tokio::test]
async fn store_failure_leaves_messages_pending() {
    let relay = SharedRelay::new();
    let alice = memory_party(&relay);
    let bob = memory_party(&relay);

    alice
        .send_token(
            json!({ "n": 1 }),
            Some(Counterparty::Other(identity_of(&bob))),
            Vec::new(),
        )
        .await
        .unwrap();

    bob.ledger().fail_submissions(true);
    let report = bob.receive_tokens().await.unwrap();
    assert!(report.accepted.is_empty());
    assert_eq!(report.rejected[0].error.kind(), ErrorKind::CollaboratorFailure);
    assert!(relay.ack_calls().is_empty());

    bob.ledger().fail_submissions(false);
    let report = bob.receive_tokens().await.unwrap();
    assert_eq!(report.accepted.len(), 1);
    assert_eq!(relay.ack_calls().len(), 1);
}

#[tokio::test]
async fn failed_acknowledgement_keeps_the_report() {
    let relay = SharedRelay::new();
    let alice = memory_party(&relay);
    let bob = memory_party(&relay);

    let (token, receipt) = alice
        .send_token(
            json!({ "n": 1 }),
            Some(Counterparty::Other(identity_of(&bob))),
            Vec::new(),
        )
        .await
        .unwrap();

    relay.fail_acknowledgements(true);
    let report = bob.receive_tokens().await.unwrap();
    assert_eq!(report.accepted.len(), 1);
    assert_eq!(report.accepted[0].txid, token.txid());
    assert!(!report.is_acknowledged());
    assert_eq!(
        report.acknowledgement_error.as_ref().unwrap().kind(),
        ErrorKind::CollaboratorFailure
    );
    assert!(!relay.is_acknowledged(&receipt.message_id));
    assert_eq!(bob.list_tokens(None).await.unwrap().len(), 1);

    // Redelivery files nothing new and clears the message.
    relay.fail_acknowledgements(false);
    let again = bob.receive_tokens().await.unwrap();
    assert_eq!(again.accepted.len(), 1);
    assert!(again.is_acknowledged());
    assert!(relay.is_acknowledged(&receipt.message_id));
    assert_eq!(bob.list_tokens(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn tag_filters_any_and_all() {
    let relay = SharedRelay::new();
    let alice = memory_party(&relay);

    for t in [&["home", "urgent"][..], &["home"][..], &["work", "urgent"][..]] {
        alice
            .create_token(json!({ "t": t }), None, tags(t))
            .await
            .unwrap();
    }

    let all = alice
        .list_tokens(Some(TagFilter::all(["home", "urgent"])))
        .await
        .unwrap();
    assert_eq!(all.len(), 1);

    let any = alice
        .list_tokens(Some(TagFilter::any(["home", "urgent"])))
        .await
        .unwrap();
    assert_eq!(any.len(), 3);

    let work = alice
        .list_tokens(Some(TagFilter::any(["work"])))
        .await
        .unwrap();
    assert_eq!(work.len(), 1);

    // newest first
    let everything = alice.list_tokens(None).await.unwrap();
    assert_eq!(everything[0].tags, tags(&["work", "urgent"]));
}

#[tokio::test]
async fn second_redemption_is_already_spent() {
    let relay = SharedRelay::new();
    let alice = memory_party(&relay);

    alice
        .create_token(json!({ "n": 1 }), None, Vec::new())
        .await
        .unwrap();
    let held = alice.list_tokens(None).await.unwrap().remove(0);

    alice.redeem(&held, None).await.unwrap();
    let err = alice.redeem(&held, None).await.unwrap_err();
    assert!(matches!(err, Error::AlreadySpent { vout: 0, .. }));
}
