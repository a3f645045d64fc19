use memberlist_coordinator::{
    error::MemberlistError,
    memberlist::{Memberlist, NodeStatus},
    store::{InMemoryMemberlistStore, MemberlistStore},
};
use proptest::prelude::*;

fn addr(octet: u8) -> String {
    format!("10.0.0.{}", octet)
}

/// Ordered memberlists without duplicate entries
fn memberlist() -> impl Strategy<Value = Memberlist> {
    prop::collection::vec(0u8..16, 0..12).prop_map(|octets| {
        let mut seen = Vec::new();
        for octet in octets {
            if !seen.contains(&octet) {
                seen.push(octet);
            }
        }
        seen.into_iter().map(addr).collect()
    })
}

fn status() -> impl Strategy<Value = NodeStatus> {
    prop_oneof![
        Just(NodeStatus::Ready),
        Just(NodeStatus::NotReady),
        Just(NodeStatus::Unknown),
    ]
}

fn others(list: &Memberlist, node: &str) -> Vec<String> {
    list.iter().filter(|m| m.as_str() != node).cloned().collect()
}

proptest! {
    #[test]
    fn reconcile_is_idempotent(list in memberlist(), node in 0u8..16, status in status()) {
        let node = addr(node);
        let once = list.reconcile(&node, status);
        let twice = once.reconcile(&node, status);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn node_appears_at_most_once(list in memberlist(), node in 0u8..16, statuses in prop::collection::vec(status(), 1..20)) {
        let node = addr(node);
        let mut current = list;
        for status in &statuses {
            current = current.reconcile(&node, *status);
            prop_assert!(current.iter().filter(|m| **m == node).count() <= 1);
        }
        let last = *statuses.last().unwrap();
        prop_assert_eq!(current.contains(&node), last == NodeStatus::Ready);
    }

    #[test]
    fn unrelated_entries_keep_their_order(list in memberlist(), node in 0u8..16, status in status()) {
        let node = addr(node);
        let result = list.reconcile(&node, status);
        prop_assert_eq!(others(&list, &node), others(&result, &node));
    }

    #[test]
    fn only_the_reconciled_node_changes(list in memberlist(), node in 0u8..16, status in status()) {
        let node = addr(node);
        let result = list.reconcile(&node, status);
        if status == NodeStatus::Ready && !list.contains(&node) {
            prop_assert_eq!(result.len(), list.len() + 1);
            prop_assert_eq!(result.as_slice().last(), Some(&node));
        } else if status != NodeStatus::Ready && list.contains(&node) {
            prop_assert_eq!(result.len(), list.len() - 1);
        } else {
            prop_assert_eq!(result, list);
        }
    }

    #[test]
    fn stale_write_never_overwrites_concurrent_change(
        initial in memberlist(),
        concurrent in memberlist(),
        node in 0u8..16,
    ) {
        let node = addr(node);
        let store = InMemoryMemberlistStore::with_members(initial);
        tokio_test::block_on(async {
            let (read, observed) = store.get_memberlist().await.unwrap();
            store.overwrite(concurrent.clone());

            let result = store
                .update_memberlist(&read.reconcile(&node, NodeStatus::Ready), &observed)
                .await;
            prop_assert!(matches!(result, Err(MemberlistError::Conflict(_))));
            prop_assert_eq!(store.members(), Some(concurrent.clone()));
            Ok(())
        })?;
    }
}
