use crate::config::TcpConfig;
use crate::layer::{Error, TxResult};
use crate::layer::ip::{AddrId, IpParams};
use crate::layer::mock::{Addresses, Link, Recorder};
use crate::managed::{BlockPool, MemoryPool};
use crate::wire::{IpAddress, SeqNumber, SocketAddress, TcpFlags, TcpMssOption};

use super::*;

const LOCAL: IpAddress = IpAddress::v4(10, 0, 0, 1);
const REMOTE: IpAddress = IpAddress::v4(10, 0, 0, 2);
const ISS: SeqNumber = SeqNumber(1000);

struct Env {
    pool: BlockPool,
    addrs: Addresses,
    ip: Recorder,
}

impl Env {
    fn new() -> Self {
        Env {
            pool: BlockPool::new(256, 64, 4),
            addrs: Addresses::new(&[LOCAL]),
            ip: Recorder::new(LOCAL),
        }
    }

    fn io(&mut self) -> Io {
        Io {
            memory: &mut self.pool,
            addrm: &self.addrs,
            ip: &mut self.ip,
        }
    }
}

fn conn() -> Connection {
    Connection {
        local: AddrId(0),
        local_port: 49152,
        remote: SocketAddress::new(REMOTE, 80),
    }
}

fn established(config: &TcpConfig, mss: u16, window: u16) -> ControlBlock {
    let mut tcb = ControlBlock::new(config, ISS);
    tcb.open(conn(), ISS);
    tcb.establish(SeqNumber(5000), window, mss);
    tcb
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| i as u8).collect()
}

#[test]
fn segments_by_mss() {
    let mut env = Env::new();
    let mut tcb = established(&TcpConfig::default(), 536, 2000);
    let data = pattern(1200);

    assert_eq!(tcb.buffer(&mut env.pool, Source::Slice(&data), false), Ok(1200));
    assert_eq!(tcb.transmit(&mut env.io()), TxResult::Ok);

    assert_eq!(env.ip.lengths(), vec![536, 536, 128]);
    let seqs: Vec<_> = env.ip.sent.iter().map(|sent| sent.seq()).collect();
    assert_eq!(seqs, vec![ISS, ISS + 536, ISS + 1072]);

    assert_eq!(env.ip.sent[0].flags(), TcpFlags::ACK);
    assert_eq!(env.ip.sent[1].flags(), TcpFlags::ACK);
    assert_eq!(env.ip.sent[2].flags(), TcpFlags::ACK | TcpFlags::PSH);

    let payload: Vec<u8> = env.ip.sent.iter()
        .flat_map(|sent| sent.payload.iter().cloned())
        .collect();
    assert_eq!(payload, data);

    for sent in &env.ip.sent {
        assert_eq!(sent.verify, Some(0xffff));
        assert_eq!(sent.tcp().ack_number(), SeqNumber(5000));
        assert_eq!(sent.tcp().window_len(), TcpConfig::default().max_rx_window);
        assert_eq!(sent.remote, REMOTE);
    }

    assert_eq!(tcb.send_nxt(), ISS + 1200);
    assert_eq!(tcb.curr_buff(), 1200);
    assert_eq!(tcb.used_buff(), 1200);
    assert!(tcb.rtx_timer_running());
    assert_eq!(env.addrs.locks.get(), 0);
}

#[test]
fn syn_consumes_one_sequence_number() {
    let mut env = Env::new();
    let config = TcpConfig::default();
    let mut tcb = ControlBlock::new(&config, ISS);
    tcb.open(conn(), ISS);

    assert_eq!(tcb.send_syn(&mut env.io(), false), TxResult::Ok);
    assert_eq!(tcb.send_nxt(), ISS + 1);

    let syn = &env.ip.sent[0];
    assert_eq!(syn.flags(), TcpFlags::SYN);
    assert_eq!(syn.seq(), ISS);
    assert_eq!(syn.header.len(), 24);
    assert_eq!(syn.tcp().mss_option(), Ok(Some(TcpMssOption(config.rx_mss))));
    assert!(syn.payload.is_empty());
    assert_eq!(syn.verify, Some(0xffff));

    // The repeated SYN does not advance the sequence again.
    assert_eq!(tcb.retransmit(&mut env.io()), TxResult::Ok);
    assert_eq!(env.ip.sent.len(), 2);
    assert_eq!(env.ip.sent[1].flags(), TcpFlags::SYN);
    assert_eq!(tcb.send_nxt(), ISS + 1);

    // Acknowledging the SYN ends the MSS option.
    tcb.acknowledge(&mut env.pool, ISS + 1, 1000);
    assert!(!tcb.flags().contains(ConnectionFlags::MSS_OPT));
    assert!(!tcb.rtx_timer_running());
    assert_eq!(tcb.send_una(), ISS + 1);
}

#[test]
fn syn_ack() {
    let mut env = Env::new();
    let mut tcb = ControlBlock::new(&TcpConfig::default(), ISS);
    tcb.open(conn(), ISS);
    tcb.recv_nxt = SeqNumber(7001);

    assert_eq!(tcb.send_syn(&mut env.io(), true), TxResult::Ok);
    let sent = &env.ip.sent[0];
    assert_eq!(sent.flags(), TcpFlags::SYN | TcpFlags::ACK);
    assert_eq!(sent.tcp().ack_number(), SeqNumber(7001));
}

#[test]
fn syn_while_offline_is_dropped() {
    let mut env = Env::new();
    env.addrs.set_link(AddrId(0), Link::Offline);
    let mut tcb = ControlBlock::new(&TcpConfig::default(), ISS);
    tcb.open(conn(), ISS);

    assert_eq!(tcb.send_syn(&mut env.io(), false), TxResult::Dropped);
    assert!(env.ip.sent.is_empty());
    assert_eq!(tcb.send_nxt(), ISS);
}

#[test]
fn nagle_sends_on_idle_connection() {
    let mut env = Env::new();
    let mut config = TcpConfig::default();
    config.nagle = true;
    let mut tcb = established(&config, 536, 1000);

    assert_eq!(tcb.buffer(&mut env.pool, Source::Slice(&pattern(10)), false), Ok(10));
    assert_eq!(tcb.transmit(&mut env.io()), TxResult::Ok);

    assert_eq!(env.ip.lengths(), vec![10]);
    assert_eq!(env.ip.sent[0].flags(), TcpFlags::ACK | TcpFlags::PSH);
    assert_eq!(tcb.send_nxt(), ISS + 10);
}

#[test]
fn nagle_coalesces_while_in_flight() {
    let mut env = Env::new();
    let mut config = TcpConfig::default();
    config.nagle = true;
    let mut tcb = established(&config, 536, 1000);

    tcb.buffer(&mut env.pool, Source::Slice(&pattern(5)), false).unwrap();
    assert_eq!(tcb.transmit(&mut env.io()), TxResult::Ok);
    assert_eq!(env.ip.lengths(), vec![5]);

    tcb.buffer(&mut env.pool, Source::Slice(&pattern(3)), false).unwrap();
    assert_eq!(tcb.transmit(&mut env.io()), TxResult::Ok);
    assert_eq!(env.ip.lengths(), vec![5]);
    assert_eq!(tcb.send_nxt(), ISS + 5);

    let acked = tcb.acknowledge(&mut env.pool, ISS + 5, 1000);
    assert_eq!(acked.confirmed, 5);
    assert_eq!(tcb.curr_buff(), 0);
    assert_eq!(tcb.used_buff(), 3);
    assert!(tcb.flags().contains(ConnectionFlags::TRANSMIT));

    assert_eq!(tcb.tick(&mut env.io(), &config), Tick::Alive);
    assert_eq!(env.ip.lengths(), vec![5, 3]);
    assert_eq!(env.ip.sent[1].seq(), ISS + 5);
    assert_eq!(tcb.send_nxt(), ISS + 8);
}

#[test]
fn nagle_sends_full_segments() {
    let mut env = Env::new();
    let mut config = TcpConfig::default();
    config.nagle = true;
    let mut tcb = established(&config, 100, 1000);

    tcb.buffer(&mut env.pool, Source::Slice(&pattern(250)), false).unwrap();
    assert_eq!(tcb.transmit(&mut env.io()), TxResult::Ok);
    // The 50 byte tail waits for the acknowledgment.
    assert_eq!(env.ip.lengths(), vec![100, 100]);
    assert_eq!(tcb.curr_buff(), 200);
}

#[test]
fn zero_window_probe_once() {
    let mut env = Env::new();
    let mut tcb = established(&TcpConfig::default(), 536, 0);

    tcb.buffer(&mut env.pool, Source::Slice(&pattern(5)), false).unwrap();
    assert_eq!(tcb.transmit(&mut env.io()), TxResult::Ok);

    assert_eq!(env.ip.lengths(), vec![1]);
    assert!(tcb.zero_window_probe_sent());
    assert_eq!(tcb.curr_buff(), 0);
    assert_eq!(tcb.send_nxt(), ISS + 1);

    tcb.flags.insert(ConnectionFlags::TRANSMIT);
    assert_eq!(tcb.transmit(&mut env.io()), TxResult::Ok);
    assert_eq!(tcb.transmit(&mut env.io()), TxResult::Ok);
    assert_eq!(env.ip.lengths(), vec![1]);

    // A window update ends the probing period.
    tcb.acknowledge(&mut env.pool, ISS, 100);
    assert!(!tcb.zero_window_probe_sent());

    assert_eq!(tcb.transmit(&mut env.io()), TxResult::Ok);
    assert_eq!(env.ip.lengths(), vec![1, 5]);
    assert_eq!(env.ip.sent[1].seq(), ISS);
    assert_eq!(env.ip.sent[1].payload, pattern(5));
    assert_eq!(tcb.send_nxt(), ISS + 5);
}

#[test]
fn shrunk_window_sends_nothing() {
    let mut env = Env::new();
    let mut tcb = established(&TcpConfig::default(), 536, 2000);

    tcb.buffer(&mut env.pool, Source::Slice(&pattern(1000)), false).unwrap();
    assert_eq!(tcb.transmit(&mut env.io()), TxResult::Ok);
    assert_eq!(env.ip.sent.len(), 2);

    // The peer shrinks its window below what is in flight.
    tcb.acknowledge(&mut env.pool, ISS, 500);
    assert_eq!(tcb.send_wnd(), 500);
    assert_eq!(tcb.evaluate_data_length(100), 0);

    tcb.buffer(&mut env.pool, Source::Slice(&pattern(100)), false).unwrap();
    assert_eq!(tcb.transmit(&mut env.io()), TxResult::Ok);
    assert_eq!(env.ip.sent.len(), 2);
    assert_eq!(tcb.curr_buff(), 1000);
}

#[test]
fn offline_transmit_is_silent() {
    let mut env = Env::new();
    env.addrs.set_link(AddrId(0), Link::Offline);
    let mut tcb = established(&TcpConfig::default(), 536, 2000);

    tcb.buffer(&mut env.pool, Source::Slice(&pattern(10)), false).unwrap();
    assert_eq!(tcb.transmit(&mut env.io()), TxResult::Ok);
    assert!(env.ip.sent.is_empty());
    assert_eq!(tcb.curr_buff(), 0);

    assert_eq!(tcb.retransmit_unsent(&mut env.io()), TxResult::Dropped);
    assert_eq!(env.addrs.locks.get(), 0);

    // A shutting down interface still lets retries through.
    env.addrs.set_link(AddrId(0), Link::Shutdown);
    assert_eq!(tcb.retransmit_unsent(&mut env.io()), TxResult::Ok);
    assert_eq!(env.ip.lengths(), vec![10]);
    assert_eq!(env.addrs.locks.get(), 0);
}

#[test]
fn failed_segment_keeps_progress() {
    let mut env = Env::new();
    let config = TcpConfig::default();
    let mut tcb = established(&config, 536, 2000);

    tcb.buffer(&mut env.pool, Source::Slice(&pattern(1200)), false).unwrap();
    env.ip.budget = Some(1);
    assert_eq!(tcb.transmit(&mut env.io()), TxResult::Dropped);

    assert_eq!(env.ip.lengths(), vec![536]);
    assert_eq!(tcb.send_nxt(), ISS + 536);
    assert_eq!(tcb.curr_buff(), 536);
    assert!(tcb.flags().contains(ConnectionFlags::RETRY));

    env.ip.budget = None;
    assert_eq!(tcb.tick(&mut env.io(), &config), Tick::Alive);
    assert_eq!(env.ip.lengths(), vec![536, 536, 128]);
    assert_eq!(tcb.send_nxt(), ISS + 1200);
    assert!(!tcb.flags().contains(ConnectionFlags::RETRY));
}

#[test]
fn retry_budget_runs_out() {
    let mut env = Env::new();
    let config = TcpConfig::default();
    let mut tcb = established(&config, 536, 2000);

    tcb.buffer(&mut env.pool, Source::Slice(&pattern(10)), false).unwrap();
    env.ip.budget = Some(0);
    assert_eq!(tcb.transmit(&mut env.io()), TxResult::Dropped);

    for _ in 1..config.transmit_retry_num {
        assert_eq!(tcb.tick(&mut env.io(), &config), Tick::Alive);
    }
    assert_eq!(tcb.tick(&mut env.io(), &config), Tick::Abort);
}

#[test]
fn retransmit_from_oldest() {
    let mut env = Env::new();
    let mut tcb = established(&TcpConfig::default(), 536, 2000);

    tcb.buffer(&mut env.pool, Source::Slice(&pattern(1200)), false).unwrap();
    assert_eq!(tcb.transmit(&mut env.io()), TxResult::Ok);
    tcb.acknowledge(&mut env.pool, ISS + 536, 2000);
    assert_eq!(tcb.used_buff(), 664);

    assert_eq!(tcb.retransmit(&mut env.io()), TxResult::Ok);
    assert_eq!(env.ip.lengths(), vec![536, 536, 128, 536, 128]);
    assert_eq!(env.ip.sent[3].seq(), ISS + 536);
    assert_eq!(env.ip.sent[3].payload, &pattern(1200)[536..1072]);
    assert_eq!(tcb.send_nxt(), ISS + 1200);
    assert_eq!(tcb.retransmissions(), 1);
}

#[test]
fn retransmit_nothing() {
    let mut env = Env::new();
    let mut tcb = established(&TcpConfig::default(), 536, 2000);

    assert_eq!(tcb.retransmit(&mut env.io()), TxResult::Ok);
    assert!(env.ip.sent.is_empty());
    assert_eq!(tcb.send_nxt(), ISS);
}

#[test]
fn fin_flushes_buffered_data() {
    let mut env = Env::new();
    let mut tcb = established(&TcpConfig::default(), 536, 2000);

    tcb.buffer(&mut env.pool, Source::Slice(&pattern(50)), false).unwrap();
    assert_eq!(tcb.send_fin(&mut env.io()), TxResult::Ok);

    assert_eq!(env.ip.lengths(), vec![50]);
    assert_eq!(env.ip.sent[0].flags(), TcpFlags::ACK | TcpFlags::PSH | TcpFlags::FIN);
    assert_eq!(tcb.send_nxt(), ISS + 51);

    let acked = tcb.acknowledge(&mut env.pool, ISS + 51, 2000);
    assert_eq!(acked.confirmed, 50);
    assert!(acked.fin_acked);
    assert_eq!(tcb.used_buff(), 0);
    assert!(!tcb.rtx_timer_running());
    assert_eq!(env.pool.live_buffers(), 0);
}

#[test]
fn bare_fin() {
    let mut env = Env::new();
    let mut tcb = established(&TcpConfig::default(), 536, 2000);

    assert_eq!(tcb.send_fin(&mut env.io()), TxResult::Ok);
    assert_eq!(env.ip.sent[0].flags(), TcpFlags::ACK | TcpFlags::FIN);
    assert_eq!(tcb.send_nxt(), ISS + 1);

    // The timer repeats the FIN without advancing further.
    assert_eq!(tcb.retransmit(&mut env.io()), TxResult::Ok);
    assert_eq!(env.ip.sent[1].flags(), TcpFlags::ACK | TcpFlags::FIN);
    assert_eq!(env.ip.sent[1].seq(), ISS);
    assert_eq!(tcb.send_nxt(), ISS + 1);
}

#[test]
fn reset_without_control_block() {
    let mut env = Env::new();
    let params = IpParams::tcp(64, false);

    let result = send_rst(
        &mut env.io(), &params, &conn(), SeqNumber(300), SeqNumber(77), 10, TcpFlags::ACK);
    assert_eq!(result, TxResult::Ok);
    let rst = &env.ip.sent[0];
    assert_eq!(rst.flags(), TcpFlags::RST);
    assert_eq!(rst.seq(), SeqNumber(300));
    assert_eq!(rst.tcp().ack_number(), SeqNumber(0));
    assert_eq!(rst.tcp().window_len(), 0);
    assert_eq!(rst.verify, Some(0xffff));

    let result = send_rst(
        &mut env.io(), &params, &conn(), SeqNumber(300), SeqNumber(77), 10, TcpFlags::SYN);
    assert_eq!(result, TxResult::Ok);
    let rst = &env.ip.sent[1];
    assert_eq!(rst.flags(), TcpFlags::RST | TcpFlags::ACK);
    assert_eq!(rst.seq(), SeqNumber(0));
    assert_eq!(rst.tcp().ack_number(), SeqNumber(87));

    env.addrs.set_link(AddrId(0), Link::Shutdown);
    assert_eq!(send_rst_ack(&mut env.io(), &params, &conn(), SeqNumber(5)), TxResult::Ok);
    assert_eq!(env.ip.sent[2].flags(), TcpFlags::RST);
    assert_eq!(env.ip.sent[2].seq(), SeqNumber(5));

    env.addrs.set_link(AddrId(0), Link::Offline);
    assert_eq!(send_rst_ack(&mut env.io(), &params, &conn(), SeqNumber(5)), TxResult::Dropped);
    assert_eq!(env.ip.sent.len(), 3);
    assert_eq!(env.addrs.locks.get(), 0);
}

#[test]
fn stateless_syn_ack() {
    let mut env = Env::new();
    let params = IpParams::tcp(64, false);
    let result = send_syn_ack_stateless(
        &mut env.io(), &params, &conn(), SeqNumber(42), SeqNumber(9), 1024, 1200);
    assert_eq!(result, TxResult::Ok);

    let sent = &env.ip.sent[0];
    assert_eq!(sent.flags(), TcpFlags::SYN | TcpFlags::ACK);
    assert_eq!(sent.seq(), SeqNumber(42));
    assert_eq!(sent.tcp().ack_number(), SeqNumber(9));
    assert_eq!(sent.tcp().mss_option(), Ok(Some(TcpMssOption(1200))));
}

#[test]
fn offloaded_checksum_is_zero() {
    let mut env = Env::new();
    let mut config = TcpConfig::default();
    config.checksum_offload = true;
    let mut tcb = established(&config, 536, 2000);

    tcb.buffer(&mut env.pool, Source::Slice(&pattern(10)), false).unwrap();
    assert_eq!(tcb.transmit(&mut env.io()), TxResult::Ok);
    assert_eq!(env.ip.sent[0].tcp().checksum(), 0);
}

#[test]
fn keep_alive_probe() {
    let mut env = Env::new();
    let mut tcb = established(&TcpConfig::default(), 536, 2000);

    assert_eq!(tcb.send_keep_alive(&mut env.io()), TxResult::Ok);
    let probe = &env.ip.sent[0];
    assert_eq!(probe.seq(), ISS - 1);
    assert_eq!(probe.flags(), TcpFlags::ACK);
    assert!(probe.payload.is_empty());
    assert_eq!(tcb.send_nxt(), ISS);
}

#[test]
fn ack_uses_next_sequence() {
    let mut env = Env::new();
    let mut tcb = established(&TcpConfig::default(), 536, 2000);
    tcb.buffer(&mut env.pool, Source::Slice(&pattern(30)), false).unwrap();
    assert_eq!(tcb.transmit(&mut env.io()), TxResult::Ok);

    tcb.ack_due();
    assert_eq!(tcb.send_ack(&mut env.io()), TxResult::Ok);
    let ack = &env.ip.sent[1];
    assert_eq!(ack.seq(), ISS + 30);
    assert_eq!(ack.flags(), TcpFlags::ACK);
    assert!(ack.payload.is_empty());
    assert_eq!(tcb.shared.lock().ack_timer, None);
    assert_eq!(tcb.shared.lock().num_unack, 0);
}

#[test]
fn data_takes_over_delayed_ack() {
    let mut env = Env::new();
    let mut tcb = established(&TcpConfig::default(), 536, 2000);

    tcb.ack_due();
    tcb.buffer(&mut env.pool, Source::Slice(&pattern(30)), false).unwrap();
    assert_eq!(tcb.transmit(&mut env.io()), TxResult::Ok);
    assert_eq!(tcb.shared.lock().ack_timer, None);
}

#[test]
fn slice_is_all_or_nothing() {
    let mut pool = BlockPool::new(64, 2, 2);
    let mut tcb = established(&TcpConfig::default(), 536, 2000);

    let data = pattern(200);
    assert_eq!(tcb.buffer(&mut pool, Source::Slice(&data), false), Err(Error::OutOfMemory));
    assert_eq!(tcb.used_buff(), 0);

    assert_eq!(tcb.buffer(&mut pool, Source::Slice(&data[..100]), false), Ok(100));
    assert_eq!(tcb.used_buff(), 100);
    assert_eq!(tcb.avail_buff(), 128);
}

#[test]
fn callback_limited_by_memory() {
    let mut pool = BlockPool::new(64, 2, 2);
    let mut tcb = established(&TcpConfig::default(), 536, 2000);

    let mut calls = 0;
    let mut copy = |chunk: &mut [u8]| {
        calls += 1;
        for byte in chunk.iter_mut() {
            *byte = 0xab;
        }
        true
    };
    let source = Source::Callback { len: 500, copy: &mut copy };
    assert_eq!(tcb.buffer(&mut pool, source, false), Ok(128));
    assert_eq!(calls, 2);
    assert_eq!(tcb.used_buff(), 128);

    let mut out = [0; 128];
    pool.get(tcb.memory.unwrap(), &mut out, 0);
    assert!(out.iter().all(|&byte| byte == 0xab));
}

#[test]
fn callback_limited_by_window() {
    let mut env = Env::new();
    let mut tcb = established(&TcpConfig::default(), 536, 100);

    let mut copy = |_: &mut [u8]| true;
    let source = Source::Callback { len: 300, copy: &mut copy };
    assert_eq!(tcb.buffer(&mut env.pool, source, false), Ok(100));

    // Forcing takes everything.
    let mut copy = |_: &mut [u8]| true;
    let source = Source::Callback { len: 300, copy: &mut copy };
    assert_eq!(tcb.buffer(&mut env.pool, source, true), Ok(300));
    assert_eq!(tcb.used_buff(), 400);
}

#[test]
fn callback_probes_closed_window() {
    let mut env = Env::new();
    let mut tcb = established(&TcpConfig::default(), 536, 0);

    let mut copy = |_: &mut [u8]| true;
    let source = Source::Callback { len: 300, copy: &mut copy };
    assert_eq!(tcb.buffer(&mut env.pool, source, false), Ok(1));
}

#[test]
fn callback_stops_copy() {
    let mut env = Env::new();
    let mut tcb = established(&TcpConfig::default(), 536, 2000);

    // Fills the first block, then refuses.
    let mut first = true;
    let mut copy = |_: &mut [u8]| core::mem::replace(&mut first, false);
    let source = Source::Callback { len: 400, copy: &mut copy };
    assert_eq!(tcb.buffer(&mut env.pool, source, true), Ok(256));
    assert_eq!(tcb.used_buff(), 256);
}

#[test]
fn deferred_free() {
    let mut env = Env::new();
    let mut tcb = established(&TcpConfig::default(), 536, 2000);

    tcb.buffer(&mut env.pool, Source::Slice(&pattern(300)), false).unwrap();
    assert_eq!(tcb.transmit(&mut env.io()), TxResult::Ok);

    // An acknowledgment arrives while a copy is running.
    tcb.shared.lock().copy_ongoing = true;
    let acked = tcb.acknowledge(&mut env.pool, ISS + 100, 2000);
    assert_eq!(acked.confirmed, 100);
    assert_eq!(tcb.used_buff(), 300);
    assert_eq!(tcb.shared.lock().data_to_free, 100);
    assert_eq!(tcb.send_una(), ISS + 100);

    tcb.end_copy(&mut env.pool);
    assert_eq!(tcb.used_buff(), 200);
    assert_eq!(tcb.curr_buff(), 200);
    assert_eq!(tcb.shared.lock().data_to_free, 0);

    let mut out = [0; 200];
    env.pool.get(tcb.memory.unwrap(), &mut out, 0);
    assert_eq!(&out[..], &pattern(300)[100..]);
}

#[test]
fn deferred_release() {
    let mut env = Env::new();
    let mut tcb = established(&TcpConfig::default(), 536, 2000);
    tcb.buffer(&mut env.pool, Source::Slice(&pattern(300)), false).unwrap();

    tcb.shared.lock().copy_ongoing = true;
    tcb.release(&mut env.pool);
    assert_eq!(env.pool.live_buffers(), 1);

    tcb.end_copy(&mut env.pool);
    assert_eq!(env.pool.live_buffers(), 0);
    assert_eq!(tcb.used_buff(), 0);
    assert_eq!(tcb.avail_buff(), 0);
}

#[test]
fn ignores_invalid_acknowledgments() {
    let mut env = Env::new();
    let mut tcb = established(&TcpConfig::default(), 536, 2000);
    tcb.buffer(&mut env.pool, Source::Slice(&pattern(100)), false).unwrap();
    assert_eq!(tcb.transmit(&mut env.io()), TxResult::Ok);

    // Beyond what was sent.
    assert_eq!(tcb.acknowledge(&mut env.pool, ISS + 200, 2000), Acknowledged::default());
    // Older than the oldest unacknowledged byte.
    assert_eq!(tcb.acknowledge(&mut env.pool, ISS - 10, 2000), Acknowledged::default());
    assert_eq!(tcb.send_una(), ISS);
    assert_eq!(tcb.used_buff(), 100);
}

#[test]
fn retransmission_timeout() {
    let mut env = Env::new();
    let mut config = TcpConfig::default();
    config.retransmit_timeout = 2;
    config.max_retransmissions = 2;
    let mut tcb = established(&config, 536, 2000);

    tcb.buffer(&mut env.pool, Source::Slice(&pattern(10)), false).unwrap();
    assert_eq!(tcb.transmit(&mut env.io()), TxResult::Ok);

    let ticks: Vec<_> = (0..6).map(|_| tcb.tick(&mut env.io(), &config)).collect();
    assert_eq!(&ticks[..5], &[Tick::Alive; 5][..]);
    assert_eq!(ticks[5], Tick::Abort);
    assert_eq!(env.ip.lengths(), vec![10, 10, 10]);
    assert!(env.ip.sent.iter().all(|sent| sent.seq() == ISS));
}

#[test]
fn delayed_ack_expires() {
    let mut env = Env::new();
    let mut config = TcpConfig::default();
    config.delayed_ack_timeout = 2;
    let mut tcb = established(&config, 536, 2000);

    tcb.ack_due();
    assert_eq!(tcb.tick(&mut env.io(), &config), Tick::Alive);
    assert!(env.ip.sent.is_empty());
    assert_eq!(tcb.tick(&mut env.io(), &config), Tick::Alive);
    assert_eq!(env.ip.sent.len(), 1);
    assert_eq!(env.ip.sent[0].flags(), TcpFlags::ACK);
}

#[test]
fn failed_ack_is_retried() {
    let mut env = Env::new();
    let mut config = TcpConfig::default();
    config.delayed_ack_timeout = 1;
    config.transmit_retry_num = 2;
    let mut tcb = established(&config, 536, 2000);

    env.ip.budget = Some(0);
    tcb.ack_due();
    assert_eq!(tcb.tick(&mut env.io(), &config), Tick::Alive);
    assert!(tcb.flags().contains(ConnectionFlags::WAIT_CONF));
    assert_eq!(tcb.tick(&mut env.io(), &config), Tick::Alive);
    assert_eq!(tcb.tick(&mut env.io(), &config), Tick::Abort);
}

#[test]
fn keep_alive_gives_up() {
    let mut env = Env::new();
    let mut config = TcpConfig::default();
    config.keep_alive = true;
    config.keep_alive_time = 3;
    config.keep_alive_interval = 2;
    config.keep_alive_probes_max = 2;
    let mut tcb = established(&config, 536, 2000);

    let ticks: Vec<_> = (0..7).map(|_| tcb.tick(&mut env.io(), &config)).collect();
    assert_eq!(&ticks[..6], &[Tick::Alive; 6][..]);
    assert_eq!(ticks[6], Tick::Abort);
    assert_eq!(env.ip.sent.len(), 2);
    assert!(env.ip.sent.iter().all(|sent| sent.seq() == ISS - 1));
}

#[test]
fn answered_keep_alive_restarts() {
    let mut env = Env::new();
    let mut config = TcpConfig::default();
    config.keep_alive = true;
    config.keep_alive_time = 2;
    config.keep_alive_probes_max = 1;
    let mut tcb = established(&config, 536, 2000);

    tcb.tick(&mut env.io(), &config);
    tcb.tick(&mut env.io(), &config);
    assert_eq!(env.ip.sent.len(), 1);

    // The peer answers the probe.
    tcb.acknowledge(&mut env.pool, ISS, 2000);
    for _ in 0..2 {
        assert_eq!(tcb.tick(&mut env.io(), &config), Tick::Alive);
    }
    assert_eq!(env.ip.sent.len(), 2);
}
