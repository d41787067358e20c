use std::thread;

use rigcosim_comm::{
    check_participants, Communicator, LoopbackComm, Message, MsgKind, Packet, TcpAcceptor, TcpComm,
};
use rigcosim_core::CosimError;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Rig side of a miniature step loop: barrier, send state, wait for reply.
fn rig_loop(comm: &mut dyn Communicator, steps: u64) -> Vec<u64> {
    let mut seen = Vec::new();
    for step in 0..steps {
        comm.barrier(step).unwrap();
        let mut body = Packet::new();
        body.push_f64(step as f64);
        comm.send(1, &Message::new(MsgKind::TireState, step, 7, body)).unwrap();
        let reply = comm.recv_expect(1, MsgKind::ContactLoad, Some(step)).unwrap();
        seen.push(reply.step);
    }
    seen
}

fn terrain_loop(comm: &mut dyn Communicator, steps: u64) {
    for step in 0..steps {
        comm.barrier(step).unwrap();
        let st = comm.recv_expect(0, MsgKind::TireState, Some(step)).unwrap();
        assert_eq!(st.body.reals, vec![step as f64]);
        comm.send(0, &Message::new(MsgKind::ContactLoad, step, st.digest, Packet::new())).unwrap();
    }
}

#[test]
fn loopback_lockstep_keeps_step_order() {
    init_tracing();
    let (mut rig, mut terrain) = LoopbackComm::pair();
    let h = thread::spawn(move || terrain_loop(&mut terrain, 25));
    let seen = rig_loop(&mut rig, 25);
    h.join().unwrap();
    assert_eq!(seen, (0..25).collect::<Vec<_>>());
}

#[test]
fn barrier_with_mismatched_step_is_a_protocol_error() {
    let (mut a, mut b) = LoopbackComm::pair();
    let h = thread::spawn(move || b.barrier(4));
    let err = a.barrier(3).unwrap_err();
    assert!(matches!(err, CosimError::Protocol(_)), "{err}");
    let _ = h.join().unwrap();
}

#[test]
fn abort_releases_a_blocked_peer() {
    let (mut a, mut b) = LoopbackComm::pair();
    let h = thread::spawn(move || b.recv_expect(0, MsgKind::TireState, Some(0)));
    a.abort("rig failed to create output directory");
    let err = h.join().unwrap().unwrap_err();
    assert!(matches!(err, CosimError::PeerAborted(ref r) if r.contains("output directory")));
}

#[test]
fn participant_count_other_than_two_is_rejected() {
    assert!(check_participants(2).is_ok());
    for n in [0, 1, 3, 4] {
        assert!(matches!(check_participants(n), Err(CosimError::Configuration(_))));
    }
    assert!(matches!(TcpComm::connect("127.0.0.1:1", 3), Err(CosimError::Configuration(_))));
}

#[test]
fn tcp_lockstep_over_localhost() {
    init_tracing();
    let acceptor = TcpAcceptor::bind("127.0.0.1:0").unwrap();
    let addr = acceptor.local_addr().unwrap().to_string();
    let h = thread::spawn(move || {
        let mut terrain = TcpComm::connect(&addr, 2).unwrap();
        assert_eq!(terrain.rank(), 1);
        terrain_loop(&mut terrain, 10);
    });
    let mut rig = acceptor.accept(2).unwrap();
    assert_eq!(rig.rank(), 0);
    let seen = rig_loop(&mut rig, 10);
    h.join().unwrap();
    assert_eq!(seen.len(), 10);
}

#[test]
fn tcp_peer_disconnect_is_reported() {
    let acceptor = TcpAcceptor::bind("127.0.0.1:0").unwrap();
    let addr = acceptor.local_addr().unwrap().to_string();
    let h = thread::spawn(move || {
        let terrain = TcpComm::connect(&addr, 2).unwrap();
        drop(terrain);
    });
    let mut rig = acceptor.accept(2).unwrap();
    h.join().unwrap();
    assert!(matches!(rig.recv(1), Err(CosimError::PeerAborted(_))));
}
