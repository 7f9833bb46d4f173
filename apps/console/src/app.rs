//! Console flows: flash an image, show the running version.

use std::io::Write;
use std::path::Path;
use std::pin::pin;
use std::sync::Arc;

use anyhow::{Context, bail};
use pendant_device_client::DeviceClient;
use pendant_firmware_update::{
    Catalog, FirmwareUpdater, MessageCatalog, MessageKey, UpdateEvent, UpdateState,
    UpdaterConfig,
};
use pendant_transfer::FirmwareImage;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::bridge::DeviceBridge;
use crate::config::ConsoleConfig;

/// Uploads `image_path` and, if `reboot` is set, reboots the device and
/// waits for it to come back.
///
/// Ctrl-C during the upload stops it before the next chunk; during the
/// reboot phase it stops waiting for the device.
pub async fn flash(config: &ConsoleConfig, image_path: &Path, reboot: bool) -> anyhow::Result<()> {
    let catalog = Catalog::new(config.language);
    let client = DeviceClient::new(&config.client_config())?;
    let updater = FirmwareUpdater::new(
        Arc::new(DeviceBridge::new(client)),
        Arc::new(catalog),
        UpdaterConfig::default(),
    );
    let mut events = updater
        .take_events()
        .context("update event stream already taken")?;

    if let Some(version) = updater.refresh_current_version().await {
        println!("{}: {version}", catalog.text(MessageKey::CurrentVersion));
    }

    let image = FirmwareImage::from_path(image_path)
        .with_context(|| format!("failed to read {}", image_path.display()))?;
    info!(path = %image_path.display(), size = image.size(), "loaded firmware image");
    updater.select_file(image)?;

    let mut upload = pin!(updater.start_upload());
    let mut interrupted = false;
    loop {
        tokio::select! {
            result = &mut upload => {
                result?;
                break;
            }
            Some(event) = events.recv() => render(&catalog, &event),
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                if updater.cancel_upload().is_ok() {
                    eprintln!();
                    eprintln!("stopping after the current chunk...");
                }
            }
        }
    }
    drain(&catalog, &mut events);
    println!();

    let snapshot = updater.snapshot();
    if snapshot.state != UpdateState::Success {
        if let Some(message) = snapshot.error_message {
            bail!(message);
        }
        println!("{}", catalog.text(MessageKey::Cancelled));
        return Ok(());
    }
    println!("{}", catalog.text(MessageKey::Written));

    if !reboot {
        return Ok(());
    }

    updater.confirm_reboot()?;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(UpdateEvent::SessionReset) => {
                    println!("{}", catalog.text(MessageKey::Reconnected));
                    break;
                }
                Some(UpdateEvent::Failed { message, .. }) => bail!(message),
                Some(event) => render(&catalog, &event),
                None => bail!("update event stream closed"),
            },
            _ = tokio::signal::ctrl_c() => {
                updater.teardown();
                eprintln!("stopped waiting for the device");
                return Ok(());
            }
        }
    }

    if let Some(version) = updater.refresh_current_version().await {
        println!("{}: {version}", catalog.text(MessageKey::CurrentVersion));
    }
    Ok(())
}

/// Prints the device's version block.
pub async fn show_version(config: &ConsoleConfig) -> anyhow::Result<()> {
    let catalog = Catalog::new(config.language);
    let client = DeviceClient::new(&config.client_config())?;
    let settings = client.settings().await?;
    let ver = settings.ver;

    println!("{}: {}", catalog.text(MessageKey::CurrentVersion), ver.firmware);
    for (label, value) in [
        ("name", &ver.name),
        ("hardware", &ver.hardware),
        ("serial", &ver.serial),
    ] {
        if !value.is_empty() {
            println!("  {label}: {value}");
        }
    }
    Ok(())
}

fn drain(catalog: &dyn MessageCatalog, events: &mut mpsc::Receiver<UpdateEvent>) {
    while let Ok(event) = events.try_recv() {
        render(catalog, &event);
    }
}

/// Prints one event. Failures are reported by the caller from the final
/// snapshot, so they are not printed here.
fn render(catalog: &dyn MessageCatalog, event: &UpdateEvent) {
    match event {
        UpdateEvent::StateChanged { state } => {
            let key = match state {
                UpdateState::Uploading => MessageKey::Uploading,
                UpdateState::Rebooting => MessageKey::Rebooting,
                UpdateState::Reconnecting => MessageKey::Reconnecting,
                _ => return,
            };
            println!("{}", catalog.text(key));
        }
        UpdateEvent::Progress(progress) => {
            print!(
                "\r  {:>3}%  {}/{} bytes",
                progress.percent, progress.bytes_sent, progress.total_size
            );
            let _ = std::io::stdout().flush();
        }
        UpdateEvent::ReconnectAttempt {
            attempt,
            max_attempts,
        } => {
            debug!(attempt, max_attempts, "probing device");
        }
        UpdateEvent::Failed { .. } | UpdateEvent::Cancelled | UpdateEvent::SessionReset => {}
    }
}
