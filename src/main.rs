use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use crossbeam_channel::{unbounded, RecvTimeoutError};
use log::{info, warn};
use rk_player::core::{PlayerConfig, PlayerEvent, SnapshotImage, VideoCodec};
use rk_player::player::{EventCallback, MediaBackend, PlayerCallbacks, PlayerSession, SnapshotCallback};
use rk_player::sim::{SimBackend, SimMedia};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 回环后端内置的演示媒体
fn demo_backend() -> SimBackend {
    let backend = SimBackend::new();
    backend.add_media(
        "/demo/movie.mp4",
        SimMedia::video(VideoCodec::H264, 1920, 1080, 25, 4000).with_audio("mp3", 44100, 2),
    );
    backend.add_media("/demo/clip.h265", SimMedia::video(VideoCodec::H265, 1280, 720, 30, 3000));
    backend.add_media("/demo/clip.h264", SimMedia::video(VideoCodec::H264, 640, 480, 25, 3000));
    backend.add_media("/demo/song.mp3", SimMedia::audio("mp3", 44100, 2, 3000));
    backend.add_media("/demo/tone.wav", SimMedia::audio("wav", 16000, 1, 2000));
    backend.add_media(
        "rtsp://127.0.0.1/live",
        SimMedia::video(VideoCodec::H264, 1280, 720, 25, 5000)
            .with_audio("pcm_alaw", 8000, 1)
            .live(),
    );
    backend
}

fn main() -> Result<()> {
    // 初始化日志
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let matches = Command::new("rk_player")
        .version(env!("CARGO_PKG_VERSION"))
        .about("媒体播放会话演示（内存回环后端）")
        .arg(
            Arg::new("uri")
                .value_name("URI")
                .default_value("/demo/movie.mp4")
                .help("媒体路径或 rtsp:// 地址"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("JSON 配置文件"),
        )
        .arg(
            Arg::new("seek")
                .short('s')
                .long("seek")
                .value_name("MS")
                .value_parser(clap::value_parser!(i64))
                .help("开始播放后跳转到该位置（毫秒）"),
        )
        .arg(
            Arg::new("snapshot")
                .long("snapshot")
                .action(ArgAction::SetTrue)
                .help("播放中抓一张图"),
        )
        .arg(
            Arg::new("timeout")
                .short('t')
                .long("timeout")
                .value_name("SECS")
                .value_parser(clap::value_parser!(u64))
                .default_value("10")
                .help("等待播放结束的最长时间"),
        )
        .get_matches();

    let config = match matches.get_one::<String>("config") {
        Some(path) => PlayerConfig::from_json_file(path)
            .with_context(|| format!("读取配置失败: {}", path))?,
        None => PlayerConfig::default(),
    };
    let uri = matches
        .get_one::<String>("uri")
        .cloned()
        .unwrap_or_else(|| "/demo/movie.mp4".to_string());
    let timeout = Duration::from_secs(matches.get_one::<u64>("timeout").copied().unwrap_or(10));

    info!("🎬 rk_player 启动: {}", uri);

    let (event_tx, event_rx) = unbounded::<PlayerEvent>();
    let on_event: EventCallback = Arc::new(move |event: PlayerEvent| {
        info!("📣 事件: {:?}", event);
        let _ = event_tx.send(event);
    });
    let on_snapshot: SnapshotCallback = Arc::new(|image: SnapshotImage| {
        info!("📸 收到抓图: {}x{}，{} 字节", image.width, image.height, image.data.len());
    });

    let backend: Arc<dyn MediaBackend> = Arc::new(demo_backend());
    let session = PlayerSession::create(
        config,
        backend,
        PlayerCallbacks {
            on_event: Some(on_event),
            on_snapshot: Some(on_snapshot),
        },
    )?;

    session.set_data_source(&uri)?;
    match session.get_duration() {
        Ok(ms) => info!("⏱️  时长: {} ms", ms),
        Err(e) => warn!("⚠️  无法获取时长: {}", e),
    }
    session.prepare()?;
    session.play()?;

    if let Some(ms) = matches.get_one::<i64>("seek") {
        std::thread::sleep(Duration::from_millis(300));
        session.seek(*ms)?;
    }
    if matches.get_flag("snapshot") {
        std::thread::sleep(Duration::from_millis(200));
        if let Err(e) = session.snapshot() {
            warn!("⚠️  抓图失败: {}", e);
        }
    }

    // ========== 等待播放结束 ==========
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match event_rx.recv_timeout(remaining) {
            Ok(PlayerEvent::Eof) => {
                info!("✅ 播放结束，位置: {:?} ms", session.get_current_position().ok());
                break;
            }
            Ok(_) => continue,
            Err(RecvTimeoutError::Timeout) => {
                info!("⏹️  等待超时，停止播放");
                break;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    session.stop()?;
    session.destroy()?;
    Ok(())
}
