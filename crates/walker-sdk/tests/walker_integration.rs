//! 整机集成测试（Mock 硬件 + Mock 链路）

use std::time::{Duration, Instant};
use walker_sdk::driver::{NavigationEvent, OverrideEvent, WalkerBuilder, WalkerConfig};
use walker_sdk::hal::mock::{MockLink, MockRig};
use walker_sdk::protocol::{Direction, Instruction};
use walker_sdk::{DriverError, Walker};

/// 收集事件直到 `done` 返回 true 或超时
fn collect_until(
    walker: &Walker,
    timeout: Duration,
    mut done: impl FnMut(&NavigationEvent) -> bool,
) -> Vec<NavigationEvent> {
    let deadline = Instant::now() + timeout;
    let mut events = Vec::new();
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        match walker.events().recv_timeout(remaining) {
            Ok(event) => {
                let finished = done(&event);
                events.push(event);
                if finished {
                    break;
                }
            },
            Err(_) => break,
        }
    }
    events
}

fn completed(events: &[NavigationEvent]) -> Vec<Instruction> {
    events
        .iter()
        .filter_map(|e| match e {
            NavigationEvent::Completed { instruction } => Some(*instruction),
            _ => None,
        })
        .collect()
}

#[test]
fn test_full_mission_over_link() {
    let rig = MockRig::new();
    let link = MockLink::new();
    // 前进时先看到白色，再看到一条线；之后一直停在线上（PICK 后退立即结束）
    rig.line_sensors[1].script([0.5, 0.5, 0.05]);
    rig.range_sensor.set(0.01);

    let walker = WalkerBuilder::new(rig.hardware())
        .link(link.clone())
        .build()
        .unwrap();
    link.push_text("INSTRUCTIONS:FORWARD,1;TURN,1,RIGHT;PICK,1;DROP,1")
        .unwrap();

    let events = collect_until(&walker, Duration::from_secs(5), |e| {
        matches!(e, NavigationEvent::Completed { instruction } if *instruction == Instruction::drop_off(1))
    });

    assert_eq!(
        completed(&events),
        vec![
            Instruction::forward(1),
            Instruction::turn(1, Direction::Right),
            Instruction::pick(1),
            Instruction::drop_off(1),
        ]
    );
    assert_eq!(rig.gripper.rotations(), vec![-630, 600]);
    assert_eq!(link.written().len(), 1);
    assert!(walker.wait_idle(Duration::from_secs(1)).unwrap());

    let metrics = walker.metrics();
    assert_eq!(metrics.frames_received, 1);
    assert_eq!(metrics.instructions_enqueued, 4);
    assert_eq!(metrics.instructions_completed, 4);
    assert_eq!(walker.status().completed, 4);
}

#[test]
fn test_tracker_steers_during_forward() {
    let rig = MockRig::new();
    // 越线传感器一直是白色，FORWARD 不会结束
    rig.line_sensors[1].set(0.5);
    rig.line_sensors[0].set(0.5);

    let walker = WalkerBuilder::new(rig.hardware()).build().unwrap();
    walker.enqueue(Instruction::forward(5));

    let deadline = Instant::now() + Duration::from_secs(5);
    while rig.left_motor.speed() <= rig.right_motor.speed() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
    // 读数在目标右侧：左轮加速，右轮减速
    assert!(rig.left_motor.speed() > rig.right_motor.speed());
    assert!(walker.gate().is_active());
    assert!(walker.metrics().tracker_iterations > 0);

    walker.stop().unwrap();
    let events = collect_until(&walker, Duration::from_secs(2), |e| {
        *e == NavigationEvent::Paused
    });
    assert_eq!(events.last(), Some(&NavigationEvent::Paused));
    assert!(!walker.gate().is_active());
    assert_eq!(walker.queue().len(), 1);
}

#[test]
fn test_emergency_stop_ends_all_threads() {
    let rig = MockRig::new();
    rig.line_sensors[1].set(0.5);
    let link = MockLink::new();

    let walker = WalkerBuilder::new(rig.hardware())
        .link(link.clone())
        .build()
        .unwrap();
    walker.submit_message("INSTRUCTIONS:FORWARD,3");

    walker.send_override(OverrideEvent::EmergencyStop).unwrap();
    let events = collect_until(&walker, Duration::from_secs(2), |e| {
        *e == NavigationEvent::EmergencyStopped
    });
    assert_eq!(events.last(), Some(&NavigationEvent::EmergencyStopped));

    let deadline = Instant::now() + Duration::from_secs(2);
    while walker.is_running() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
    assert!(!walker.is_running());
    assert!(walker.gate().is_shut_down());
    assert!(walker.status().halted);
    assert!(matches!(walker.start(), Err(DriverError::EmergencyStopped)));
}

#[test]
fn test_stalled_instruction_pauses() {
    let rig = MockRig::new();
    rig.line_sensors[1].set(0.5);

    let mut config = WalkerConfig::default();
    config.navigation.instruction_timeout_ms = Some(30);
    let walker = WalkerBuilder::new(rig.hardware())
        .config(config)
        .build()
        .unwrap();
    walker.enqueue(Instruction::forward(1));

    let events = collect_until(&walker, Duration::from_secs(2), |e| {
        matches!(e, NavigationEvent::Stalled { .. })
    });
    assert!(matches!(
        events.last(),
        Some(NavigationEvent::Stalled { instruction, .. }) if *instruction == Instruction::forward(1)
    ));
    // 事件先于状态快照发布
    let deadline = Instant::now() + Duration::from_secs(1);
    while !walker.status().paused && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
    assert!(walker.status().paused);
    assert_eq!(walker.metrics().stalls, 1);
    assert!(matches!(
        walker.wait_idle(Duration::from_millis(10)),
        Err(DriverError::Stalled { instruction, .. }) if instruction == Instruction::forward(1)
    ));
}

#[test]
fn test_ignored_message_does_not_enqueue() {
    let rig = MockRig::new();
    let walker = WalkerBuilder::new(rig.hardware()).build().unwrap();
    walker.submit_message("HELLO:WORLD");
    walker.submit_message("no separator at all");
    assert!(walker.queue().is_empty());
    assert_eq!(walker.metrics().messages_ignored, 2);
}
