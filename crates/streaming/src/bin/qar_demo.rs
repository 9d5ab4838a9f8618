//! QAR streaming demo
//!
//! Walks through the session, scene and render APIs against the in-process
//! visualizer backend.
//!
//! # Examples
//!
//! ```bash
//! # Host and guest joining one session, then inviting a visualizer
//! qar-demo session --guests 2
//!
//! # GUI panel operations
//! qar-demo --console-log gui-panels --uri https://example.com
//!
//! # Stream gradient frames to a visualizer and print delivery stats
//! qar-demo cpu-render --frames 120 --width 640 --height 360 --json
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use qar_streaming::peer::{self, VisualizerBackend};
use qar_streaming::render::TextureRequest;
use qar_streaming::scene::{AppVolumeSize, GuiPanelSize, Pose};
use qar_streaming::{
    library, AppVolumeInit, FrameShow, GuiPanelInit, GuiPanelState, InvitePeerInit, LibraryInit,
    NearFar, PeerId, RenderSender, RenderSenderInit, Runtime, RuntimeInit, Session,
    SessionCreateInit, SessionJoinInit,
};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// QAR streaming demo
#[derive(Parser)]
#[command(name = "qar-demo")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Folder scanned for graphics backends (default: next to the executable)
    #[arg(long, global = true, env = "QAR_RUNTIME_DIR")]
    runtime_dir: Option<PathBuf>,

    /// Write qar-streaming.log into this folder
    #[arg(long, global = true, env = "QAR_LOG_FOLDER")]
    log_folder: Option<PathBuf>,

    /// Log to stdout
    #[arg(long, global = true)]
    console_log: bool,

    /// Increase verbosity (can be used multiple times)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a session, join it as host and guests, invite a visualizer
    Session {
        /// Guests joining next to the host
        #[arg(long, default_value_t = 1)]
        guests: u32,
    },

    /// Add, move, resize, navigate and close a GUI panel
    GuiPanels {
        /// Page the panel navigates to
        #[arg(long, default_value = "https://example.com/")]
        uri: String,
    },

    /// Add app volumes and enumerate them
    AppVolumes {
        /// Volumes to add
        #[arg(long, default_value_t = 3)]
        count: u32,
    },

    /// Render gradient frames on the CPU and stream them to a visualizer
    CpuRender {
        /// Frames to show
        #[arg(long, default_value_t = 60)]
        frames: u64,

        #[arg(long, default_value_t = 640)]
        width: u32,

        #[arg(long, default_value_t = 360)]
        height: u32,

        /// Print delivery stats as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let mut config = LibraryInit::default()
        .with_console_logging(cli.console_log)
        .with_log_filter(log_filter);
    if let Some(folder) = &cli.log_folder {
        config = config.with_log_folder(folder);
    }
    library::init(&config).context("failed to initialize the streaming library")?;

    let result = run(&cli);

    library::destroy().context("failed to tear down the streaming library")?;
    result
}

fn run(cli: &Cli) -> Result<()> {
    let mut runtime_init = RuntimeInit::default();
    if let Some(dir) = &cli.runtime_dir {
        runtime_init = runtime_init.with_binaries_folder(dir);
    }
    let runtime = Runtime::create(&runtime_init).context("failed to create runtime")?;
    println!(
        "Runtime ready (binaries: {}, backends: {:?})",
        runtime.binaries_folder().display(),
        runtime.graphics_backends()
    );

    match &cli.command {
        Commands::Session { guests } => run_session(&runtime, *guests),
        Commands::GuiPanels { uri } => run_gui_panels(&runtime, uri),
        Commands::AppVolumes { count } => run_app_volumes(&runtime, *count),
        Commands::CpuRender {
            frames,
            width,
            height,
            json,
        } => run_cpu_render(&runtime, *frames, *width, *height, *json),
    }
}

fn join_host(runtime: &Runtime) -> Result<(Session, Vec<u8>)> {
    let invite = runtime
        .create_session(&SessionCreateInit::default())
        .context("failed to create session")?;
    println!(
        "Session {} created ({} byte invite)",
        invite.session_id(),
        invite.data_size()
    );

    let data = invite.to_bytes();
    let host = Session::join(&SessionJoinInit::new(data.clone(), "Host"))?;
    Ok((host, data))
}

/// Invite `connection_string` and wait for the outcome
fn invite_and_wait(session: &Session, connection_string: &str) -> Result<PeerId> {
    let (tx, rx) = mpsc::channel();
    session.invite_peer_async(
        &InvitePeerInit::new(connection_string),
        move |result| {
            let _ = tx.send(result);
        },
        |message| println!("  invitation: {}", message),
    )?;

    let outcome = rx
        .recv_timeout(Duration::from_secs(30))
        .context("invitation never completed")?;
    Ok(outcome?)
}

fn run_session(runtime: &Runtime, guests: u32) -> Result<()> {
    let (host, invite) = join_host(runtime)?;

    let mut joined = Vec::new();
    for n in 1..=guests {
        let guest = Session::join(&SessionJoinInit::new(invite.clone(), format!("Guest {}", n)))?;
        joined.push(guest);
    }

    let connection_string = peer::connection_string_visualizer()?;
    println!("Inviting visualizer at {}", connection_string);
    let visualizer = invite_and_wait(&host, &connection_string)?;
    println!("Visualizer joined as peer {}", visualizer);

    for peer in host.peers() {
        println!("  {} {:<12} {:?}", peer.peer_id, peer.display_name, peer.origin);
    }

    drop(joined);
    host.destroy();
    Ok(())
}

fn run_gui_panels(runtime: &Runtime, uri: &str) -> Result<()> {
    let (host, invite) = join_host(runtime)?;
    let guest = Session::join(&SessionJoinInit::new(invite, "Guest"))?;

    let panels = host.gui_panels();
    let init = GuiPanelInit::new("Browser", GuiPanelSize::new(1.2, 0.8))
        .with_pose(Pose::at(0.0, 1.5, -1.0));
    let id = panels.add_panel(&init)?;
    println!("Added panel {}", id);

    panels.update_pose(id, Pose::at(0.5, 1.5, -1.5))?;
    panels.change_size(id, GuiPanelSize::new(1.6, 0.9))?;
    panels.navigate_to_uri(id, uri)?;
    panels.set_state(id, GuiPanelState::Minimized)?;

    // The guest sees the host's changes
    for handle in guest.gui_panels().query(16) {
        let panel = handle.snapshot()?;
        println!(
            "  {} '{}' {:?} {}x{} m, uri {:?}",
            panel.id,
            panel.display_name,
            panel.state.state,
            panel.size.width_meters,
            panel.size.height_meters,
            panel.state.uri.as_ref().map(|u| u.to_string())
        );
    }

    let closed = panels.close_panel(id)?;
    println!("Closed panel {} (state {})", closed.id, closed.state.state);
    Ok(())
}

fn run_app_volumes(runtime: &Runtime, count: u32) -> Result<()> {
    let (host, _) = join_host(runtime)?;
    let volumes = host.app_volumes();

    for n in 0..count {
        let init = AppVolumeInit::new(format!("Volume {}", n), AppVolumeSize::new(0.5, 0.5, 0.5))
            .with_pose(Pose::at(n as f32, 0.0, -2.0));
        volumes.add_volume(&init)?;
    }

    println!("{} app volumes:", volumes.count());
    for handle in volumes.query(count as usize) {
        println!("  {} '{}'", handle.id()?, handle.display_name()?);
    }
    Ok(())
}

fn run_cpu_render(
    runtime: &Runtime,
    frames: u64,
    width: u32,
    height: u32,
    json: bool,
) -> Result<()> {
    let (host, _) = join_host(runtime)?;

    let visualizer = Arc::new(VisualizerBackend::new());
    let connection_string = peer::register_visualizer(Arc::clone(&visualizer))?;
    invite_and_wait(&host, &connection_string)?;

    let init = RenderSenderInit::cpu().with_textures(vec![
        TextureRequest::color(width, height),
        TextureRequest::depth(width, height),
    ]);
    let mut sender = RenderSender::create(&host, &init, None)?;
    for texture in sender.layout().textures() {
        println!(
            "  {:?} {}x{} {:?}, pitch {}",
            texture.role, texture.width, texture.height, texture.format, texture.pitch
        );
    }

    let show = FrameShow {
        near_far: NearFar::new(0.1, 20.0),
    };
    for _ in 0..frames {
        let info = sender.begin_frame()?;
        {
            let mut frame = sender.frame_cpu()?;
            let phase = (info.frame_index % 256) as u8;
            if let Some(color) = frame.planes.first_mut() {
                fill_gradient(color.width(), phase, color.rows_mut());
            }
        }
        sender.show_frame(&show)?;
    }

    let deadline = Instant::now() + Duration::from_secs(10);
    while sender.stats().delivered + sender.stats().dropped < frames {
        if Instant::now() > deadline {
            bail!("frames were not delivered within 10s");
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    let stats = sender.stats();
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!(
            "Shown {}, delivered {}, dropped {}; visualizer received {}",
            stats.shown,
            stats.delivered,
            stats.dropped,
            visualizer.frames_received()
        );
    }
    Ok(())
}

fn fill_gradient<'a>(width: u32, phase: u8, rows: impl Iterator<Item = &'a mut [u8]>) {
    for (y, row) in rows.enumerate() {
        for (x, pixel) in row.chunks_exact_mut(4).enumerate() {
            pixel[0] = ((x as u32 * 255) / width.max(1)) as u8;
            pixel[1] = (y % 256) as u8;
            pixel[2] = phase;
            pixel[3] = 255;
        }
    }
}
