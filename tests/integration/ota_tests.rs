//! Firmware update manager over the simulated HTTP image source and the
//! simulated flash slot.

use soilresp::adapters::flash::FlashSlot;
use soilresp::adapters::http::{HttpImageSource, SimImageServer, SimResponse};
use soilresp::app::ports::FirmwareUpdater;
use soilresp::ota::{
    ConfirmOutcome, FirmwareUpdateManager, OtaError, UpdateReport, confirm_running_image,
};

use crate::mock_hw::image;

type Manager = FirmwareUpdateManager<HttpImageSource, FlashSlot>;

fn manager(server: &SimImageServer, capacity: u32, port: u16) -> Manager {
    FirmwareUpdateManager::new(
        HttpImageSource::simulated(server.clone()),
        FlashSlot::new(capacity),
        port,
        "/soilresp.signed.bin",
    )
}

fn assert_slot_untouched(m: &Manager) {
    assert!(!m.slot().is_writing());
    assert!(m.slot().boot_pending().is_none());
}

#[test]
fn update_boot_and_confirm() {
    let server = SimImageServer::new();
    let firmware = image(10_000);
    server.serve(&firmware);
    let mut m = manager(&server, 64 * 1024, 80);

    assert_eq!(
        m.update("fw.example.org"),
        Ok(UpdateReport {
            bytes_written: 10_000
        })
    );

    m.slot_mut().reboot();
    assert_eq!(m.slot().running(), &firmware[..]);

    assert_eq!(confirm_running_image(m.slot_mut()), Ok(ConfirmOutcome::Confirmed));
    assert_eq!(
        confirm_running_image(m.slot_mut()),
        Ok(ConfirmOutcome::AlreadyConfirmed)
    );
    assert_eq!(m.slot().confirms(), 1);
    assert_eq!(m.slot().erases(), 1);
}

#[test]
fn non_default_port_is_in_the_url() {
    let server = SimImageServer::new();
    server.serve(&image(16));
    let mut m = manager(&server, 1024, 8080);

    m.update("10.0.0.7").unwrap();
    assert_eq!(
        server.requests(),
        vec!["http://10.0.0.7:8080/soilresp.signed.bin"]
    );
}

#[test]
fn http_error_leaves_slot_untouched() {
    let server = SimImageServer::new();
    server.serve_response(SimResponse::status(404));
    let mut m = manager(&server, 1024, 80);

    assert_eq!(m.update("fw.example.org"), Err(OtaError::HttpStatus(404)));
    assert_slot_untouched(&m);
}

#[test]
fn oversize_image_rejected_before_any_write() {
    let server = SimImageServer::new();
    server.serve(&image(2_000));
    let mut m = manager(&server, 1_000, 80);

    assert_eq!(
        m.update("fw.example.org"),
        Err(OtaError::Oversize {
            declared: 2_000,
            capacity: 1_000
        })
    );
    assert_slot_untouched(&m);
}

#[test]
fn short_body_aborts_the_slot() {
    let server = SimImageServer::new();
    server.serve_response(SimResponse {
        content_length: Some(100),
        ..SimResponse::ok(&image(60))
    });
    let mut m = manager(&server, 1024, 80);

    assert_eq!(
        m.update("fw.example.org"),
        Err(OtaError::Truncated {
            expected: 100,
            received: 60
        })
    );
    assert_slot_untouched(&m);
}

#[test]
fn flash_failure_then_clean_retry() {
    let server = SimImageServer::new();
    let firmware = image(1_500);
    server.serve(&firmware);
    server.serve(&firmware);
    let mut m = manager(&server, 4096, 80);

    m.slot_mut().fail_writes(true);
    assert_eq!(m.update("fw.example.org"), Err(OtaError::FlashWrite));
    assert_slot_untouched(&m);

    m.slot_mut().fail_writes(false);
    assert!(m.update("fw.example.org").is_ok());
    assert_eq!(m.slot().boot_pending(), Some(&firmware[..]));
}

#[test]
fn missing_length_rejected_before_any_write() {
    let server = SimImageServer::new();
    server.serve_response(SimResponse {
        content_length: None,
        ..SimResponse::ok(&image(64))
    });
    let mut m = manager(&server, 1024, 80);

    assert_eq!(m.update("fw.example.org"), Err(OtaError::MissingLength));
    assert_slot_untouched(&m);
}

#[test]
fn dropped_download_aborts_the_slot() {
    let server = SimImageServer::new();
    server.serve_response(SimResponse {
        fail_after: Some(700),
        ..SimResponse::ok(&image(2_048))
    });
    let mut m = manager(&server, 4096, 80);

    assert_eq!(m.update("fw.example.org"), Err(OtaError::Transport));
    assert_slot_untouched(&m);
}

#[test]
fn unreachable_server_is_a_transport_error() {
    let server = SimImageServer::new();
    let mut m = manager(&server, 1024, 80);
    assert_eq!(m.update("fw.example.org"), Err(OtaError::Transport));
    assert!(server.requests().is_empty());
}
