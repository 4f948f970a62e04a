//! Property-based serialization tests.
//!
//! Uses proptest to verify:
//! 1. Any task survives envelope serialize → deserialize.
//! 2. Task lists keep their order and contents.
//! 3. Arbitrary text never panics the envelope decoder.
//! 4. Random bytes never panic the RPC frame decoder.
//! 5. Any call frame survives postcard encode → decode.
//! 6. Timestamps keep their UTC offset through a document rewrite.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{DateTime, FixedOffset};
use proptest::prelude::*;
use rsd_proto::envelope::{self, Envelope};
use rsd_proto::rpc::{self, Method, RpcMessage};
use rsd_proto::{Id, Task, TaskId, Timestamp};

// --- Strategies ---

/// Timestamps between 1970 and roughly 2100, at microsecond precision,
/// with or without a whole-minute UTC offset.
fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
    (
        0i64..4_102_444_800,
        0u32..1_000_000,
        prop::option::of(-14 * 60..=14 * 60i32),
    )
        .prop_map(|(secs, micros, offset_minutes)| {
            let wall = DateTime::from_timestamp(secs, micros * 1_000)
                .unwrap()
                .naive_utc();
            match offset_minutes {
                Some(minutes) => {
                    Timestamp::with_offset(wall, FixedOffset::east_opt(minutes * 60).unwrap())
                }
                None => Timestamp::from(wall),
            }
        })
}

fn arb_task_id() -> impl Strategy<Value = TaskId> {
    "[a-zA-Z0-9-]{1,40}".prop_map(TaskId::new)
}

fn arb_task() -> impl Strategy<Value = Task> {
    (
        arb_task_id(),
        ".{0,200}",
        any::<bool>(),
        arb_timestamp(),
        prop::option::of(arb_timestamp()),
        prop::option::of(arb_timestamp()),
        any::<bool>(),
    )
        .prop_map(|(id, title, done, created, completed, due, pinned)| Task {
            id,
            title,
            done,
            created,
            completed: if done { completed } else { None },
            due,
            pinned,
        })
}

fn arb_method() -> impl Strategy<Value = Method> {
    prop::sample::select(Method::ALL.to_vec())
}

// --- Properties ---

proptest! {
    #[test]
    fn task_envelope_round_trip(task in arb_task()) {
        let text = envelope::serialize_task(&task).unwrap();
        let decoded = envelope::deserialize(&text).unwrap();
        prop_assert_eq!(decoded, Some(Envelope::Task(task)));
    }

    #[test]
    fn id_envelope_round_trip(id in arb_task_id()) {
        let text = envelope::serialize_id(&id).unwrap();
        let decoded = envelope::deserialize(&text).unwrap();
        prop_assert_eq!(decoded, Some(Envelope::Id(Id::from(id))));
    }

    #[test]
    fn task_list_round_trip(tasks in prop::collection::vec(arb_task(), 0..20)) {
        let text = envelope::serialize_tasks(&tasks).unwrap();
        prop_assert_eq!(envelope::deserialize_tasks(&text).unwrap(), tasks);
    }

    #[test]
    fn reserializing_a_document_is_stable(tasks in prop::collection::vec(arb_task(), 0..10)) {
        let first = envelope::serialize_tasks(&tasks).unwrap();
        let reread = envelope::deserialize_tasks(&first).unwrap();
        let second = envelope::serialize_tasks(&reread).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn timestamp_text_round_trip(ts in arb_timestamp()) {
        prop_assert_eq!(Timestamp::parse(&ts.to_string()), Some(ts));
    }

    #[test]
    fn envelope_decoder_never_panics(text in ".{0,256}") {
        let _ = envelope::deserialize(&text);
    }

    #[test]
    fn frame_decoder_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = rpc::decode(&bytes);
    }

    #[test]
    fn call_frame_round_trip(
        call_id in any::<u64>(),
        method in arb_method(),
        args in prop::collection::vec(".{0,64}", 0..3),
    ) {
        let msg = RpcMessage::Call { call_id, method, args };
        let bytes = rpc::encode(&msg).unwrap();
        prop_assert_eq!(rpc::decode(&bytes).unwrap(), msg);
    }
}
