// End-to-end behaviour of the bridge as the Java side sees it
//
// Every test goes through the same entry points the JVM exports call, with
// the in-memory host standing in for the VM.

use jlightgrep::testing::{Harness, MockHost};
use jlightgrep::{class_names, HandleRegistry, PinMode};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

const ILLEGAL_STATE: &str = "java/lang/IllegalStateException";
const DESTROYED: &str = "Tried calling method on destroyed handle";

fn exception_class(host: &MockHost) -> Option<String> {
    host.take_exception().map(|(class, _)| class)
}

#[test]
fn test_destroy_is_idempotent() {
    let harness = Harness::new();
    let bridge = harness.bridge();
    let parser = harness.parser_with(&[("abc", 0)]);
    let program = harness.program(&parser, false);
    let context = harness.context(&program);
    assert_eq!(harness.handles.live_count(), 3);

    for _ in 0..2 {
        bridge.context_destroy(&context);
        bridge.program_destroy(&program);
        bridge.parser_destroy(&parser);
    }
    assert_eq!(harness.host.pending_exception(), None);
    assert_eq!(harness.handles.live_count(), 0);
    for handle in [&parser, &program, &context] {
        assert_eq!(harness.host.pointer(handle), 0);
    }
}

#[test]
fn test_use_after_destroy_is_illegal_state() {
    let harness = Harness::new();
    let bridge = harness.bridge();
    let host = &harness.host;
    let parser = harness.parser_with(&[("abc", 0)]);
    let program = harness.program(&parser, false);
    let context = harness.context(&program);
    let callback = host.new_callback();
    let buffer = host.new_byte_array(b"abc".to_vec());

    bridge.parser_destroy(&parser);
    bridge.program_destroy(&program);
    bridge.context_destroy(&context);

    let keyword = host.new_string("x");
    let key_options = host.new_key_options(false, false);
    let encoding = host.new_string("ASCII");
    assert_eq!(
        bridge.parser_add_keyword(&parser, Some(&keyword), 0, Some(&key_options), Some(&encoding)),
        0
    );
    assert_eq!(host.take_exception(), Some((ILLEGAL_STATE.into(), DESTROYED.into())));

    assert_eq!(bridge.program_size(&program), -1);
    assert_eq!(host.take_exception(), Some((ILLEGAL_STATE.into(), DESTROYED.into())));

    let context_options = host.new_context_options();
    assert!(bridge
        .program_create_context(&program, Some(&context_options))
        .is_none());
    assert_eq!(host.take_exception(), Some((ILLEGAL_STATE.into(), DESTROYED.into())));

    assert_eq!(
        bridge.context_search(&context, Some(&buffer), 0, 3, 0, Some(&callback)),
        0
    );
    assert_eq!(host.take_exception(), Some((ILLEGAL_STATE.into(), DESTROYED.into())));

    bridge.context_closeout_search(&context, Some(&callback));
    assert_eq!(exception_class(host).as_deref(), Some(ILLEGAL_STATE));
    bridge.context_reset(&context);
    assert_eq!(exception_class(host).as_deref(), Some(ILLEGAL_STATE));
    assert!(host.hits(&callback).is_empty());
    assert_eq!(host.open_pins(), 0);
}

#[test]
fn test_copied_token_is_stale_after_destroy() {
    let harness = Harness::new();
    let parser = harness.parser_with(&[("abc", 0)]);
    let copy = harness.host.new_parser_handle(harness.host.pointer(&parser));

    harness.bridge().parser_destroy(&parser);
    // slot reuse must not revive the copied token
    let _other = harness.parser(0);

    let options = harness.host.new_program_options(false);
    assert!(harness
        .bridge()
        .parser_create_program(&copy, Some(&options))
        .is_none());
    assert_eq!(
        harness.host.take_exception(),
        Some((ILLEGAL_STATE.into(), DESTROYED.into()))
    );
}

#[test]
fn test_buffer_bounds_are_checked() {
    let harness = Harness::new();
    let bridge = harness.bridge();
    let host = &harness.host;
    let parser = harness.parser_with(&[("abc", 0)]);
    let program = harness.program(&parser, false);
    let context = harness.context(&program);
    let callback = host.new_callback();
    let buffer = host.new_byte_array(vec![0; 4]);

    bridge.context_starts_with(&context, Some(&buffer), 2, 3, 0, Some(&callback));
    assert_eq!(
        host.take_exception(),
        Some((
            "java/lang/IndexOutOfBoundsException".into(),
            "buffer.length == 4, offset == 2, buffer.length - offset < size == 3".into()
        ))
    );

    assert!(bridge.program_read(Some(&buffer), 1, 4).is_none());
    assert_eq!(
        host.take_exception().map(|(_, message)| message).as_deref(),
        Some("buffer.length == 4, offset == 1, buffer.length - offset < size == 4")
    );

    bridge.program_write(&program, Some(&buffer), 0);
    assert_eq!(
        exception_class(host).as_deref(),
        Some("java/lang/IndexOutOfBoundsException")
    );

    // nothing was pinned for any rejected call
    assert!(host.pin_log().is_empty());
}

#[test]
fn test_negative_arguments_are_rejected() {
    let harness = Harness::new();
    let bridge = harness.bridge();
    let host = &harness.host;
    let buffer = host.new_byte_array(vec![0; 8]);

    assert!(bridge.program_read(Some(&buffer), -1, 4).is_none());
    assert_eq!(
        host.take_exception().map(|(_, m)| m).as_deref(),
        Some("offset == -1 < 0")
    );
    assert!(bridge.program_read(Some(&buffer), 0, -4).is_none());
    assert_eq!(
        host.take_exception().map(|(_, m)| m).as_deref(),
        Some("size == -4 < 0")
    );
    assert!(bridge.program_read(None, -1, -1).is_none());
    assert_eq!(
        host.take_exception(),
        Some(("java/lang/NullPointerException".into(), "buffer == null".into()))
    );
}

#[test]
fn test_program_round_trip_searches_identically() {
    let harness = Harness::new();
    let bridge = harness.bridge();
    let parser = harness.parser_with(&[("cat", 0), ("do+g", 1)]);
    let program = harness.program(&parser, true);

    let size = bridge.program_size(&program);
    let buffer = harness.host.new_byte_array(vec![0; size as usize]);
    bridge.program_write(&program, Some(&buffer), 0);
    let loaded = bridge.program_read(Some(&buffer), 0, size).unwrap();

    let data = b"a cat, a doooog, and a dog";
    let mut results = Vec::new();
    for program in [&program, &loaded] {
        let context = harness.context(program);
        let callback = harness.host.new_callback();
        harness.search(&context, data, 0, &callback);
        bridge.context_closeout_search(&context, Some(&callback));
        results.push(harness.host.hits(&callback));
    }
    assert_eq!(results[0], results[1]);
    assert_eq!(
        results[0],
        vec![(2, 5, 0), (9, 15, 1), (23, 26, 1)]
    );
    assert_eq!(harness.host.pending_exception(), None);
}

#[test]
fn test_hits_arrive_in_order_across_buffers() {
    let harness = Harness::new();
    let parser = harness.parser_with(&[("hello", 0), ("world", 1)]);
    let program = harness.program(&parser, false);
    let context = harness.context(&program);
    let callback = harness.host.new_callback();

    let data = b"-----hello----------world";
    let mut offset = 0i64;
    for chunk in data.chunks(7) {
        harness.search(&context, chunk, offset, &callback);
        offset += chunk.len() as i64;
    }
    harness.bridge().context_closeout_search(&context, Some(&callback));
    assert_eq!(harness.host.hits(&callback), vec![(5, 10, 0), (20, 25, 1)]);
}

#[test]
fn test_closeout_reports_trailing_match_once() {
    let harness = Harness::new();
    let parser = harness.parser_with(&[("ab+", 3)]);
    let program = harness.program(&parser, false);
    let context = harness.context(&program);
    let callback = harness.host.new_callback();

    // the match might still grow, so search reports nothing yet
    assert_eq!(harness.search(&context, b"xabbb", 0, &callback), 1);
    assert!(harness.host.hits(&callback).is_empty());

    harness.bridge().context_closeout_search(&context, Some(&callback));
    harness.bridge().context_closeout_search(&context, Some(&callback));
    assert_eq!(harness.host.hits(&callback), vec![(1, 5, 3)]);

    // more b's continuing the stream neither extend nor repeat the closed match
    assert_eq!(harness.search(&context, b"bbx", 5, &callback), 8);
    harness.bridge().context_closeout_search(&context, Some(&callback));
    assert_eq!(harness.host.hits(&callback), vec![(1, 5, 3)]);
    assert_eq!(harness.host.pending_exception(), None);
}

#[test]
fn test_null_keyword_leaves_parser_usable() {
    let harness = Harness::new();
    let bridge = harness.bridge();
    let host = &harness.host;
    let parser = harness.parser(0);
    let options = host.new_key_options(false, false);
    let encoding = host.new_string("UTF-8");

    assert_eq!(
        bridge.parser_add_keyword(&parser, None, 0, Some(&options), Some(&encoding)),
        0
    );
    assert_eq!(
        exception_class(host).as_deref(),
        Some("java/lang/NullPointerException")
    );

    let keyword = host.new_string("ok");
    assert_eq!(
        bridge.parser_add_keyword(&parser, Some(&keyword), 0, Some(&options), Some(&encoding)),
        1
    );
    let program = harness.program(&parser, false);
    assert!(bridge.program_size(&program) > 0);
}

#[test]
fn test_case_insensitive_option_is_honoured() {
    let harness = Harness::new();
    let bridge = harness.bridge();
    let host = &harness.host;
    let parser = harness.parser(0);
    let encoding = host.new_string("ASCII");

    let sensitive = host.new_string("Key");
    let plain = host.new_key_options(false, false);
    bridge.parser_add_keyword(&parser, Some(&sensitive), 0, Some(&plain), Some(&encoding));
    let folded = host.new_string("Word");
    let insensitive = host.new_key_options(false, true);
    bridge.parser_add_keyword(&parser, Some(&folded), 1, Some(&insensitive), Some(&encoding));
    assert_eq!(host.pending_exception(), None);

    let program = harness.program(&parser, false);
    let context = harness.context(&program);
    let callback = host.new_callback();
    harness.search(&context, b"KEY WORD Key", 0, &callback);
    bridge.context_closeout_search(&context, Some(&callback));
    assert_eq!(host.hits(&callback), vec![(4, 8, 1), (9, 12, 0)]);
}

#[test]
fn test_program_outlives_destroyed_parser() {
    let harness = Harness::new();
    let parser = harness.parser_with(&[("abc", 0)]);
    let program = harness.program(&parser, false);
    harness.bridge().parser_destroy(&parser);

    let context = harness.context(&program);
    harness.bridge().program_destroy(&program);

    let callback = harness.host.new_callback();
    harness.search(&context, b"zabc", 0, &callback);
    assert_eq!(harness.host.hits(&callback), vec![(1, 4, 0)]);
}

#[test]
fn test_pins_released_with_the_right_mode() {
    let harness = Harness::new();
    let bridge = harness.bridge();
    let host = &harness.host;
    let parser = harness.parser_with(&[("abc", 0)]);
    let program = harness.program(&parser, false);
    let context = harness.context(&program);
    let size = bridge.program_size(&program);
    let buffer = host.new_byte_array(vec![0; size as usize]);
    let callback = host.new_callback();

    bridge.program_write(&program, Some(&buffer), 0);
    bridge.program_read(Some(&buffer), 0, size).unwrap();
    bridge.context_search(&context, Some(&buffer), 0, size, 0, Some(&callback));
    bridge.context_starts_with(&context, Some(&buffer), 0, size, 0, Some(&callback));

    assert_eq!(
        host.pin_log(),
        vec![
            PinMode::CopyBack,
            PinMode::Discard,
            PinMode::Discard,
            PinMode::Discard
        ]
    );
    assert_eq!(host.open_pins(), 0);
}

#[test]
fn test_pin_failure_surfaces_out_of_memory() {
    let harness = Harness::new();
    let parser = harness.parser_with(&[("abc", 0)]);
    let program = harness.program(&parser, false);
    let context = harness.context(&program);
    let callback = harness.host.new_callback();

    harness.host.fail_next_pin();
    assert_eq!(harness.search(&context, b"abc", 0, &callback), 0);
    assert_eq!(
        exception_class(&harness.host).as_deref(),
        Some("java/lang/OutOfMemoryError")
    );
    assert!(harness.host.hits(&callback).is_empty());

    // the context is still usable afterwards
    harness.search(&context, b"abc", 0, &callback);
    assert_eq!(harness.host.hits(&callback), vec![(0, 3, 0)]);
}

#[test]
fn test_callback_exception_stops_delivery() {
    let harness = Harness::new();
    let parser = harness.parser_with(&[("a", 0)]);
    let program = harness.program(&parser, false);
    let context = harness.context(&program);
    let callback = harness.host.new_callback_with(|host, n| {
        if n == 1 {
            host.throw("java/lang/IllegalArgumentException", "enough");
        }
    });

    assert_eq!(harness.search(&context, b"aaaaa", 0, &callback), 0);
    assert_eq!(
        harness.host.take_exception(),
        Some(("java/lang/IllegalArgumentException".into(), "enough".into()))
    );
    assert_eq!(harness.host.hits(&callback), vec![(0, 1, 0), (1, 2, 0)]);
    assert_eq!(harness.host.live_hits(), 0);
    assert_eq!(harness.host.open_pins(), 0);

    // the aborted stream was discarded
    let fresh = harness.host.new_callback();
    harness.bridge().context_closeout_search(&context, Some(&fresh));
    assert!(harness.host.hits(&fresh).is_empty());
}

#[test]
fn test_callback_exception_in_starts_with_and_closeout() {
    let harness = Harness::new();
    let parser = harness.parser_with(&[("a+", 0)]);
    let program = harness.program(&parser, false);
    let context = harness.context(&program);
    let throwing = harness
        .host
        .new_callback_with(|host, _| host.throw("java/lang/Error", "no"));
    let buffer = harness.host.new_byte_array(b"aa".to_vec());

    harness
        .bridge()
        .context_starts_with(&context, Some(&buffer), 0, 2, 0, Some(&throwing));
    assert_eq!(exception_class(&harness.host).as_deref(), Some("java/lang/Error"));

    let quiet = harness.host.new_callback();
    harness.search(&context, b"aa", 0, &quiet);
    harness.bridge().context_closeout_search(&context, Some(&throwing));
    assert_eq!(exception_class(&harness.host).as_deref(), Some("java/lang/Error"));
    assert_eq!(harness.host.hits(&throwing), vec![(0, 2, 0), (0, 2, 0)]);
}

#[test]
fn test_hit_allocation_failure_stops_delivery() {
    let harness = Harness::new();
    let parser = harness.parser_with(&[("x", 0)]);
    let program = harness.program(&parser, false);
    let context = harness.context(&program);
    let callback = harness.host.new_callback();

    harness.host.fail_hit_allocation_after(2);
    assert_eq!(harness.search(&context, b"xxxxx", 0, &callback), 0);
    assert_eq!(
        exception_class(&harness.host).as_deref(),
        Some("java/lang/OutOfMemoryError")
    );
    assert_eq!(harness.host.hits(&callback), vec![(0, 1, 0), (1, 2, 0)]);
}

#[test]
fn test_failure_to_raise_is_fatal() {
    let harness = Harness::new();
    let parser = harness.parser_with(&[("abc", 0)]);
    harness.host.fail_throws();

    let keyword = harness.host.new_string("bad\\");
    let options = harness.host.new_key_options(false, false);
    let encoding = harness.host.new_string("UTF-8");
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        harness.bridge().parser_add_keyword(
            &parser,
            Some(&keyword),
            0,
            Some(&options),
            Some(&encoding),
        )
    }));
    assert!(outcome.is_err());
    assert!(harness.host.fatal_message().is_some());
}

#[test]
fn test_unbound_classes_are_illegal_state() {
    let harness = Harness::unbound(Arc::new(HandleRegistry::new()));
    let bridge = harness.bridge();
    let host = &harness.host;

    let token = bridge.parser_create(0);
    assert_ne!(token, 0);
    let parser = host.new_parser_handle(token);
    let options = host.new_program_options(false);
    assert!(bridge.parser_create_program(&parser, Some(&options)).is_none());
    assert_eq!(
        host.take_exception(),
        Some((ILLEGAL_STATE.into(), "ParserHandle is not initialized".into()))
    );

    harness.bind(class_names::PARSER_HANDLE);
    assert!(bridge.parser_create_program(&parser, Some(&options)).is_none());
    assert_eq!(
        host.take_exception(),
        Some((ILLEGAL_STATE.into(), "ProgramOptions is not initialized".into()))
    );
}

#[test]
fn test_class_reload_requires_rebinding() {
    let harness = Harness::new();
    let parser = harness.parser_with(&[("abc", 0)]);
    harness.host.reload_class(class_names::PROGRAM_OPTIONS);
    let options = harness.host.new_program_options(true);

    // identities from the old class version are unusable
    assert!(harness
        .bridge()
        .parser_create_program(&parser, Some(&options))
        .is_none());
    assert_eq!(
        exception_class(&harness.host).as_deref(),
        Some("java/lang/RuntimeException")
    );

    harness.bind(class_names::PROGRAM_OPTIONS);
    let program = harness
        .bridge()
        .parser_create_program(&parser, Some(&options));
    assert!(program.is_some());
    assert_eq!(harness.host.pending_exception(), None);
}

#[test]
fn test_program_matching_empty_string_is_rejected() {
    // header, no byte sets, one Match instruction, one entry at it
    let mut blob = b"LGPROGRM".to_vec();
    for field in [1u32, 0, 0, 1, 1, 52, 0, 0, 0, 0, 0] {
        blob.extend_from_slice(&field.to_le_bytes());
    }
    assert_eq!(blob.len(), 52);

    let harness = Harness::new();
    let buffer = harness.host.new_byte_array(blob);
    assert!(harness.bridge().program_read(Some(&buffer), 0, 52).is_none());
    let (class, message) = harness.host.take_exception().unwrap();
    assert_eq!(class, "com/lightboxtechnologies/lightgrep/ProgramException");
    assert!(message.contains("entry 0 matches the empty string"), "{}", message);
    assert_eq!(harness.handles.live_count(), 0);
    assert_eq!(harness.host.open_pins(), 0);
}

#[test]
fn test_corrupt_program_is_program_exception() {
    let harness = Harness::new();
    let bridge = harness.bridge();
    let parser = harness.parser_with(&[("abc", 0), ("d.f", 1)]);
    let program = harness.program(&parser, false);
    let size = bridge.program_size(&program);
    let buffer = harness.host.new_byte_array(vec![0; size as usize]);
    bridge.program_write(&program, Some(&buffer), 0);
    let mut bytes = harness.host.bytes(&buffer);

    // format version
    bytes[8..12].copy_from_slice(&99u32.to_le_bytes());
    let corrupt = harness.host.new_byte_array(bytes);
    assert!(bridge.program_read(Some(&corrupt), 0, size).is_none());
    let (class, message) = harness.host.take_exception().unwrap();
    assert_eq!(class, "com/lightboxtechnologies/lightgrep/ProgramException");
    assert!(message.contains("version"), "{}", message);

    assert!(bridge.program_read(Some(&buffer), 0, size - 1).is_none());
    assert_eq!(
        exception_class(&harness.host).as_deref(),
        Some("com/lightboxtechnologies/lightgrep/ProgramException")
    );
}

#[test]
fn test_search_after_unload_is_illegal_state() {
    let harness = Harness::new();
    harness.bindings.on_unload(Some(&harness.host));
    assert_eq!(harness.host.global_refs(), 0);

    let parser = harness.parser_with(&[("abc", 0)]);
    let program = harness.program(&parser, false);
    let context = harness.context(&program);
    let callback = harness.host.new_callback();
    assert_eq!(harness.search(&context, b"abc", 0, &callback), 0);
    assert_eq!(
        harness.host.take_exception(),
        Some((ILLEGAL_STATE.into(), "HitCallback is not initialized".into()))
    );
}

#[test]
fn test_handles_created_by_the_bridge_have_host_classes() {
    let harness = Harness::new();
    let parser = harness.parser_with(&[("abc", 0)]);
    let program = harness.program(&parser, false);
    let context = harness.context(&program);
    assert_eq!(
        harness.host.class_of(&program).as_deref(),
        Some(class_names::PROGRAM_HANDLE)
    );
    assert_eq!(
        harness.host.class_of(&context).as_deref(),
        Some(class_names::CONTEXT_HANDLE)
    );
}
