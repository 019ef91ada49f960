/// Messenger over a real CompanionNode talking to a scripted radio.
///
/// The radio answers every channel send with `Sent` and then, if the script
/// says so, pushes a receive-log entry that looks like a repeater relaying
/// the message.
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use wxmesh_protocol::packet::header_byte;
use wxmesh_protocol::{
    AlertSink, Channel, Messenger, RouteType, SendConfig, PAYLOAD_TYPE_GRP_TXT,
};
use wxmesh_transport::{
    encode_radio_frame, push_code, response_code, Command, CompanionConfig, CompanionNode,
    FrameDecoder,
};

const REPEATER: u8 = 0x42;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();
}

/// What the radio hears after each send, in order. Missing entries are silence.
enum Heard {
    Nothing,
    OurRelay,
    OtherChannel,
}

#[derive(Default)]
struct Radio {
    script: Vec<Heard>,
    sends: Vec<String>,
}

fn relay_log(channel_hash: u8) -> Vec<u8> {
    let mut push = vec![push_code::LOG_RX_DATA, 40, (-70i8) as u8];
    push.push(header_byte(RouteType::Flood, PAYLOAD_TYPE_GRP_TXT, 0));
    push.extend([1, REPEATER]);
    push.extend([channel_hash, 0x10, 0x20, 0x30]);
    push
}

async fn run_radio(mut stream: DuplexStream, radio: Arc<Mutex<Radio>>, hash: u8) {
    let mut decoder = FrameDecoder::to_radio(512);
    let mut buf = [0u8; 256];
    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        decoder.push(&buf[..n]);
        while let Some(frame) = decoder.next_frame() {
            let command = Command::from_bytes(&frame.unwrap()).unwrap();
            let Command::SendChannelText { text, .. } = command else {
                continue;
            };
            let heard = {
                let mut radio = radio.lock().unwrap();
                radio.sends.push(text);
                if radio.script.is_empty() {
                    Heard::Nothing
                } else {
                    radio.script.remove(0)
                }
            };

            let sent = vec![response_code::SENT, 0, 1, 2, 3, 4, 5, 6, 7, 8];
            stream.write_all(&encode_radio_frame(&sent).unwrap()).await.unwrap();
            let log = match heard {
                Heard::Nothing => None,
                Heard::OurRelay => Some(relay_log(hash)),
                Heard::OtherChannel => Some(relay_log(hash.wrapping_add(1))),
            };
            if let Some(log) = log {
                stream.write_all(&encode_radio_frame(&log).unwrap()).await.unwrap();
            }
        }
    }
}

fn setup(script: Vec<Heard>) -> (Messenger, Channel, Arc<Mutex<Radio>>) {
    init_tracing();
    let channel = Channel::from_name(1, "#alerts");
    let (host, device) = tokio::io::duplex(4096);
    let radio = Arc::new(Mutex::new(Radio {
        script,
        ..Default::default()
    }));
    tokio::spawn(run_radio(device, radio.clone(), channel.hash()));

    let node = CompanionNode::from_stream(host, CompanionConfig::tcp("fake:0"));
    let config = SendConfig {
        repeat_wait: Duration::from_secs(5),
        max_retries: 3,
        cooldown: Duration::from_secs(1),
        ..Default::default()
    };
    (Messenger::new(Arc::new(node), config), channel, radio)
}

#[tokio::test(start_paused = true)]
async fn test_first_send_confirmed_by_repeater() {
    let (messenger, channel, radio) = setup(vec![Heard::OurRelay]);

    let report = messenger.send_alert("🌍 quake: mag:M3.1 Modra (33km North)", &channel).await;

    assert!(report.is_confirmed());
    assert_eq!(report.relay(), Some(REPEATER));
    assert_eq!(report.attempts.len(), 1);
    assert_eq!(radio.lock().unwrap().sends.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_other_channel_traffic_does_not_confirm() {
    let (messenger, channel, radio) =
        setup(vec![Heard::OtherChannel, Heard::Nothing, Heard::OurRelay]);

    let started = tokio::time::Instant::now();
    let report = messenger.send_alert("☢️ Senec (25km East) 60 CPM", &channel).await;

    assert!(report.is_confirmed());
    assert_eq!(report.attempts.len(), 3);
    assert!(!report.attempts[0].confirmed);
    assert!(report.attempts[2].confirmed);
    // Two full windows, then the cooldown.
    assert!(started.elapsed() >= Duration::from_secs(11));
    assert_eq!(radio.lock().unwrap().sends.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_unheard_alert_gives_up_after_max_retries() {
    let (messenger, channel, radio) = setup(Vec::new());

    let started = tokio::time::Instant::now();
    let report = messenger.send_alert("🌩️ Pezinok (20km North)", &channel).await;

    assert!(!report.is_confirmed());
    assert_eq!(report.attempts.len(), 3);
    assert!(started.elapsed() >= Duration::from_secs(16));
    let sends = radio.lock().unwrap().sends.clone();
    assert_eq!(sends, vec!["🌩️ Pezinok (20km North)".to_string(); 3]);
}

#[tokio::test(start_paused = true)]
async fn test_long_alert_is_truncated_on_air() {
    let (messenger, channel, radio) = setup(vec![Heard::OurRelay]);
    let long = "storm ".repeat(40);

    let report = messenger.send_alert(&long, &channel).await;

    assert!(report.text.len() <= 155);
    let sends = radio.lock().unwrap().sends.clone();
    assert_eq!(sends, vec![report.text.clone()]);
    assert!(sends[0].ends_with("storm"));
}
