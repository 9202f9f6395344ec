/// 单目标检测+跟踪 (detrack)
///
/// 系统架构:
/// 1. 帧来源:   图像序列, 按配置旋转为正向
/// 2. 分析:     Controller (检测 → 跟踪 → 丢失后同帧重新检测)
///              --realtime 时在独立分析线程运行, 只保留最新帧
/// 3. 叠加显示: 目标框经坐标映射画到显示画布, 写入输出目录
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use crossbeam_channel::Receiver;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use detrack_rs::controller::csrt_factory;
use detrack_rs::input::ImageSequence;
use detrack_rs::models::build_model;
use detrack_rs::overlay::{load_font, Overlay};
use detrack_rs::pipeline::FrameWorker;
use detrack_rs::{
    gen_time_string, AppConfig, Args, Controller, Detector, Diagnostic, LabelMap, TrackingEvent,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();
    let mut config = AppConfig::load(&args.config)?;
    args.apply(&mut config);
    config.print_summary();

    // ========== 模型 (加载失败即退出) ==========
    let labels = match &config.labels {
        Some(path) => LabelMap::from_file(path)?,
        None => LabelMap::coco(),
    };
    if !labels.contains(&config.detector.target_class) {
        warn!("⚠️ 标签表中没有目标类别 {}", config.detector.target_class);
    }
    let backend = build_model(config.ort_config(args.ep(), args.fp16), labels, args.profile)?;
    info!("✅ 模型加载成功: {}", config.model);

    // ========== 控制器 ==========
    let (diag_tx, diag_rx) = crossbeam_channel::unbounded::<Diagnostic>();
    let detector = Detector::new(backend, config.detector.clone());
    let controller =
        Controller::new(detector, csrt_factory(config.tracker.clone())).with_diagnostics(diag_tx);

    // ========== 输出 ==========
    let mut overlay = Overlay::new(config.policy, config.display_width, config.display_height);
    if let Some(path) = &config.font {
        match load_font(path) {
            Ok(font) => {
                info!("✅ 状态字体加载成功: {}", path);
                overlay = overlay.with_font(font);
            }
            Err(e) => warn!("⚠️ 状态字体加载失败, 横幅不显示文字: {:#}", e),
        }
    }
    let output = match &args.output {
        Some(dir) => {
            let run_dir = Path::new(dir).join(gen_time_string("-"));
            std::fs::create_dir_all(&run_dir)?;
            info!("💾 叠加图像输出到 {}", run_dir.display());
            Some(run_dir)
        }
        None => None,
    };
    let presenter = Presenter { overlay, output };

    let frames = ImageSequence::open(&args.source, config.rotation)?;
    let total = frames.len();
    info!("🚀 开始处理 {} 帧", total);

    let controller = if args.realtime {
        run_realtime(controller, frames, &presenter, &diag_rx)?
    } else {
        run_serial(controller, frames, &presenter, &diag_rx)?
    };

    let stats = controller.stats();
    info!(
        "✅ 完成: {} 帧 | 检测 {} 次 | 跟踪 {} 次 | 丢失 {} 次 | 重新捕获 {} 次 | 推理错误 {} | 初始化错误 {}",
        stats.frames,
        stats.detections,
        stats.tracker_updates,
        stats.losses,
        stats.reacquisitions,
        stats.inference_errors,
        stats.tracker_init_errors
    );
    Ok(())
}

/// 逐帧串行处理
fn run_serial(
    mut controller: Controller,
    frames: ImageSequence,
    presenter: &Presenter,
    diagnostics: &Receiver<Diagnostic>,
) -> Result<Controller> {
    for frame in frames {
        let frame = match frame {
            Ok(f) => f,
            Err(e) => {
                warn!("⚠️ 读取帧失败, 跳过: {}", e);
                continue;
            }
        };
        let event = controller.process(frame);
        presenter.present(&event)?;
        drain_diagnostics(diagnostics);
    }
    Ok(controller)
}

/// 采集线程 (当前线程) 只管提交, 分析线程只处理最新帧
fn run_realtime(
    controller: Controller,
    frames: ImageSequence,
    presenter: &Presenter,
    diagnostics: &Receiver<Diagnostic>,
) -> Result<Controller> {
    let mut worker = FrameWorker::spawn(controller)?;
    let events = worker.events().clone();

    for frame in frames {
        match frame {
            Ok(f) => {
                worker.submit(f)?;
            }
            Err(e) => warn!("⚠️ 读取帧失败, 跳过: {}", e),
        }
        for event in events.try_iter() {
            presenter.present(&event)?;
        }
        drain_diagnostics(diagnostics);
    }

    let submitted = worker.submitted();
    let dropped = worker.dropped_frames();
    let controller = worker.shutdown()?;
    for event in events.try_iter() {
        presenter.present(&event)?;
    }
    drain_diagnostics(diagnostics);
    info!("⏭️ 提交 {} 帧, 丢弃 {} 帧", submitted, dropped);
    Ok(controller)
}

struct Presenter {
    overlay: Overlay,
    output: Option<PathBuf>,
}

impl Presenter {
    fn present(&self, event: &TrackingEvent) -> Result<()> {
        match &event.bbox {
            Some(b) => info!(
                "🎯 帧 {} [{:?}] ({:.0}, {:.0}, {:.0}, {:.0})",
                event.frame_id(),
                event.source,
                b.x1(),
                b.y1(),
                b.x2(),
                b.y2()
            ),
            None => info!("👀 帧 {} 画面中没有目标", event.frame_id()),
        }

        if let Some(dir) = &self.output {
            let canvas = self.overlay.compose(event)?;
            canvas.save(dir.join(format!("frame_{:06}.png", event.frame_id())))?;
        }
        Ok(())
    }
}

fn drain_diagnostics(rx: &Receiver<Diagnostic>) {
    for diagnostic in rx.try_iter() {
        match diagnostic {
            Diagnostic::Inference { frame_id, error } => warn!("❌ 帧 {}: {}", frame_id, error),
            Diagnostic::TrackerInit { frame_id, error } => warn!("❌ 帧 {}: {}", frame_id, error),
            Diagnostic::TrackingLost { frame_id, reason } => info!("🔄 帧 {} 跟踪丢失: {}", frame_id, reason),
        }
    }
}
