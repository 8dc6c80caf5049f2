//! Two-participant scenarios through the relay simulator.

use lingua_core::{Direction, Hydration, MessageOrigin, SessionNotice};
use lingua_harness::{
    SimRelay, history_records,
    scenario::{Scenario, Step, oracle},
};
use lingua_proto::Role;

fn relay() -> SimRelay {
    SimRelay::new()
        .with_translation("Hello", "ko", "안녕하세요")
        .with_translation("안녕하세요, 도와드릴까요?", "vi", "Xin chào, tôi có thể giúp gì?")
}

#[test]
fn customer_message_reaches_agent_in_korean() {
    let result = Scenario::new("customer to agent")
        .customer("vi")
        .agent()
        .relay(relay())
        .step(Step::send(Role::Customer, "Hello"))
        .oracle(oracle::all_of(vec![
            oracle::all_joined(),
            oracle::last_message(Role::Agent, Direction::Received, "안녕하세요", Some("Hello")),
            oracle::last_message(Role::Customer, Direction::Sent, "Hello", None),
            oracle::projection_holds(),
            oracle::message_count(1),
        ]))
        .run();

    assert!(result.is_ok(), "scenario failed: {:?}", result);
}

#[test]
fn agent_message_reaches_customer_in_vietnamese() {
    let result = Scenario::new("agent to customer")
        .customer("vi")
        .agent()
        .relay(relay())
        .step(Step::send(Role::Agent, "안녕하세요, 도와드릴까요?"))
        .oracle(oracle::all_of(vec![
            oracle::last_message(
                Role::Customer,
                Direction::Received,
                "Xin chào, tôi có thể giúp gì?",
                Some("안녕하세요, 도와드릴까요?"),
            ),
            oracle::last_message(Role::Agent, Direction::Sent, "안녕하세요, 도와드릴까요?", None),
            oracle::projection_holds(),
        ]))
        .run();

    assert!(result.is_ok(), "scenario failed: {:?}", result);
}

#[test]
fn typing_then_stop_clears_indicator() {
    let result = Scenario::new("typing then stop")
        .customer("vi")
        .agent()
        .step(Step::Typing(Role::Customer))
        .step(Step::StopTyping(Role::Customer))
        .oracle(oracle::counterpart_typing(Role::Agent, false))
        .run();

    assert!(result.is_ok(), "scenario failed: {:?}", result);
}

#[test]
fn duplicate_typing_is_idempotent() {
    let result = Scenario::new("typing twice")
        .customer("vi")
        .agent()
        .step(Step::Typing(Role::Agent))
        .step(Step::Typing(Role::Agent))
        .oracle(Box::new(|world| {
            oracle::counterpart_typing(Role::Customer, true)(world)?;
            let changes = world
                .notices(Role::Customer)
                .iter()
                .filter(|n| matches!(n, SessionNotice::TypingChanged(_)))
                .count();
            if changes != 1 {
                return Err(format!("expected one typing notice, got {changes}"));
            }
            Ok(())
        }))
        .run();

    assert!(result.is_ok(), "scenario failed: {:?}", result);
}

#[test]
fn presence_is_announced_to_the_later_joiner() {
    let result = Scenario::new("presence")
        .customer("vi")
        .agent()
        .oracle(Box::new(|world| {
            let agent = world.session(Role::Agent).ok_or("agent missing")?;
            assert!(agent.counterpart_online());
            assert_eq!(agent.counterpart_language(), Some("vi"));

            // The customer joined first and is never told.
            let customer = world.session(Role::Customer).ok_or("customer missing")?;
            assert!(!customer.counterpart_online());
            Ok(())
        }))
        .run();

    assert!(result.is_ok(), "scenario failed: {:?}", result);
}

#[test]
fn reconnect_rejoins_without_second_hydration() {
    let result = Scenario::new("reconnect")
        .customer("vi")
        .agent()
        .history(history_records(3))
        .step(Step::send(Role::Customer, "Hello"))
        .step(Step::Reconnect(Role::Customer))
        .step(Step::send(Role::Customer, "Hello"))
        .oracle(Box::new(|world| {
            assert_eq!(world.fetches(Role::Customer), 1);
            // join, send, join again, send
            assert_eq!(world.frames_sent(Role::Customer), 4);

            let customer = world.session(Role::Customer).ok_or("customer missing")?;
            assert!(customer.is_joined());
            assert_eq!(customer.hydration(), Hydration::Applied);
            let origins: Vec<MessageOrigin> = customer.messages().iter().map(|m| m.origin).collect();
            assert_eq!(
                origins,
                vec![
                    MessageOrigin::History,
                    MessageOrigin::History,
                    MessageOrigin::History,
                    MessageOrigin::Live,
                    MessageOrigin::Live,
                ]
            );
            Ok(())
        }))
        .run();

    assert!(result.is_ok(), "scenario failed: {:?}", result);
}

#[test]
fn reactivation_hydrates_again() {
    let result = Scenario::new("reactivate")
        .customer("vi")
        .agent()
        .history(history_records(2))
        .step(Step::Reactivate(Role::Agent))
        .oracle(Box::new(|world| {
            assert_eq!(world.fetches(Role::Agent), 2);
            let agent = world.session(Role::Agent).ok_or("agent missing")?;
            assert_eq!(agent.messages().len(), 2);
            Ok(())
        }))
        .run();

    assert!(result.is_ok(), "scenario failed: {:?}", result);
}

#[test]
fn end_chat_reaches_both_sides() {
    let result = Scenario::new("end chat")
        .customer("vi")
        .agent()
        .step(Step::EndChat(Role::Agent))
        .oracle(Box::new(|world| {
            for role in [Role::Customer, Role::Agent] {
                let session = world.session(role).ok_or("missing")?;
                assert!(session.is_ended(), "{role} should see the chat ended");
                assert_eq!(session.ended_by(), Some("agent"));
            }
            assert!(world.relay().is_ended());
            Ok(())
        }))
        .run();

    assert!(result.is_ok(), "scenario failed: {:?}", result);
}

#[test]
fn failed_translation_is_reported_not_fatal() {
    let result = Scenario::new("translation failure")
        .customer("vi")
        .agent()
        .relay(SimRelay::new().failing_on("???"))
        .step(Step::send(Role::Customer, "???"))
        .step(Step::send(Role::Customer, "Cảm ơn"))
        .oracle(Box::new(|world| {
            let errors = world
                .notices(Role::Customer)
                .iter()
                .filter(|n| matches!(n, SessionNotice::RelayError { .. }))
                .count();
            assert_eq!(errors, 1);
            oracle::last_message(Role::Agent, Direction::Received, "[ko] Cảm ơn", Some("Cảm ơn"))(
                world,
            )?;
            oracle::message_count(1)(world)
        }))
        .run();

    assert!(result.is_ok(), "scenario failed: {:?}", result);
}

#[test]
fn commands_after_disconnect_are_dropped() {
    let result = Scenario::new("disconnected send")
        .customer("vi")
        .agent()
        .step(Step::Disconnect(Role::Customer))
        .step(Step::send(Role::Customer, "Hello"))
        .oracle(Box::new(|world| {
            assert_eq!(world.frames_sent(Role::Customer), 1, "only the join went out");
            oracle::message_count(0)(world)
        }))
        .run();

    assert!(result.is_ok(), "scenario failed: {:?}", result);
}

#[test]
fn torn_down_session_ignores_traffic() {
    let result = Scenario::new("teardown")
        .customer("vi")
        .agent()
        .step(Step::Teardown(Role::Agent))
        .step(Step::send(Role::Customer, "Hello"))
        .oracle(Box::new(|world| {
            let agent = world.session(Role::Agent).ok_or("agent missing")?;
            assert!(agent.is_torn_down());
            assert!(agent.messages().is_empty());
            oracle::ids_unique()(world)
        }))
        .run();

    assert!(result.is_ok(), "scenario failed: {:?}", result);
}
