//! Group key rotation and exclusion, end to end.

use box2::core::{EncryptionKey, GroupKeyInfo, KeyScheme, MsgId, RecipientId};
use box2::keyring::KeyRingError;
use box2::{Box2Error, Decrypted, GroupId};
use box2_testkit::TestActor;

const K1: [u8; 32] = [1; 32];
const K2: [u8; 32] = [2; 32];

fn group() -> GroupId {
    GroupId::from_bytes([7; 32])
}

fn info(key: [u8; 32]) -> GroupKeyInfo {
    GroupKeyInfo::new(key, MsgId::from_bytes([0xaa; 32]))
}

async fn add_key(actors: &[&TestActor], key: [u8; 32]) {
    for actor in actors {
        actor
            .engine
            .keyring()
            .add_group_info(group(), info(key))
            .await
            .unwrap();
    }
}

fn seal(author: &TestActor, text: &[u8]) -> bytes::Bytes {
    author
        .engine
        .encrypt(text, &author.keypair, None, &[RecipientId::Group(group())])
        .unwrap()
}

#[tokio::test]
async fn test_rotation_keeps_old_messages_readable() {
    let author = TestActor::legacy().await.unwrap();
    let member = TestActor::legacy().await.unwrap();

    add_key(&[&author, &member], K1).await;
    let first = seal(&author, b"under k1");

    add_key(&[&author, &member], K2).await;
    let state = member.engine.keyring().get_group_info(&group()).unwrap().unwrap();
    assert_eq!(state.write_key().unwrap().as_bytes(), &K1);
    assert_eq!(
        state.read_keys(),
        &[
            EncryptionKey::new(K1, KeyScheme::PrivateGroup),
            EncryptionKey::new(K2, KeyScheme::PrivateGroup),
        ]
    );

    for actor in [&author, &member] {
        actor
            .engine
            .keyring()
            .pick_group_write_key(group(), K2)
            .await
            .unwrap();
    }
    let state = member.engine.keyring().get_group_info(&group()).unwrap().unwrap();
    assert_eq!(state.write_key().unwrap().as_bytes(), &K2);
    assert_eq!(state.read_keys().len(), 2);

    let second = seal(&author, b"under k2");
    assert_eq!(
        member.engine.decrypt(&first, &author.id(), None).unwrap(),
        Decrypted::Plaintext(b"under k1".to_vec())
    );
    assert_eq!(
        member.engine.decrypt(&second, &author.id(), None).unwrap(),
        Decrypted::Plaintext(b"under k2".to_vec())
    );
}

#[tokio::test]
async fn test_pick_unknown_write_key() {
    let actor = TestActor::legacy().await.unwrap();
    add_key(&[&actor], K1).await;

    let err = actor
        .engine
        .keyring()
        .pick_group_write_key(group(), K2)
        .await
        .unwrap_err();
    assert!(matches!(err, KeyRingError::UnknownKey));
}

#[tokio::test]
async fn test_exclusion() {
    let author = TestActor::legacy().await.unwrap();
    let member = TestActor::legacy().await.unwrap();
    add_key(&[&author, &member], K1).await;
    let before = seal(&author, b"before exclusion");

    let keyring = member.engine.keyring();
    keyring.exclude_group(group()).await.unwrap();

    assert!(!keyring.list_group_ids(false).unwrap().contains(&group()));
    assert!(keyring.list_group_ids(true).unwrap().contains(&group()));
    assert!(keyring.get_group_info(&group()).unwrap().unwrap().write_key().is_none());

    assert_eq!(
        member.engine.decrypt(&before, &author.id(), None).unwrap(),
        Decrypted::Plaintext(b"before exclusion".to_vec())
    );

    let err = member
        .engine
        .encrypt(b"x", &member.keypair, None, &[RecipientId::Group(group())])
        .unwrap_err();
    assert!(matches!(
        err,
        Box2Error::KeyRing(KeyRingError::GroupExcluded(_))
    ));

    // re-adding info does not reactivate the group
    assert!(matches!(
        keyring.add_group_info(group(), info(K2)).await,
        Err(KeyRingError::GroupExcluded(_))
    ));
}

#[tokio::test]
async fn test_decrypt_is_a_function_of_key_state() {
    let author = TestActor::legacy().await.unwrap();
    let late = TestActor::legacy().await.unwrap();
    add_key(&[&author], K1).await;
    let envelope = seal(&author, b"catch up");

    for _ in 0..2 {
        assert!(late
            .engine
            .decrypt(&envelope, &author.id(), None)
            .unwrap()
            .is_undecryptable());
    }

    add_key(&[&late], K1).await;
    for _ in 0..2 {
        assert_eq!(
            late.engine.decrypt(&envelope, &author.id(), None).unwrap(),
            Decrypted::Plaintext(b"catch up".to_vec())
        );
    }
}

#[tokio::test]
async fn test_group_must_be_first_slot() {
    let author = TestActor::legacy().await.unwrap();
    add_key(&[&author], K1).await;

    let err = author
        .engine
        .encrypt(
            b"x",
            &author.keypair,
            None,
            &[RecipientId::AuthorSelf, RecipientId::Group(group())],
        )
        .unwrap_err();
    assert!(matches!(err, Box2Error::InvalidRecipients { .. }));
    assert!(err.to_string().contains("first slot"));
}
