use duetto_bridge::{MessageFromBackend, audio::InputDevice, notification::NotificationType};

/// Handles an incoming audio devices list request (see
/// [`duetto_bridge::MessageToBackend::AudioDevicesListRequest`]).
pub async fn handle_audio_devices_list_request(context: super::AppContextHandle) {
    let (selected_id, host) = {
        let state = context.state.read().await;
        (
            state.config.audio_device_config.selected_device_id.clone(),
            state.active_host.clone(),
        )
    };

    let devices = match duetto_audio::device::list_host_input_devices(&host) {
        Ok(devices) => devices,
        Err(err) => {
            log::error!("Failed to enumerate input devices: {err}");
            context
                .send_notification(NotificationType::Error, "Could not list input devices.")
                .await;
            return;
        }
    };

    let response_devices: Vec<InputDevice> = devices
        .iter()
        .map(|device| InputDevice {
            id: device.id.clone(),
            description: device.description.clone(),
            selected: selected_id.as_deref() == Some(device.id.as_str()),
        })
        .collect();

    context
        .send(MessageFromBackend::AudioDevicesListResponse(response_devices))
        .await;
}

/// Handles an audio device selection request and persists it to config. A
/// running capture transport is restarted on the new device.
pub async fn handle_audio_device_selection(context: super::AppContextHandle, id: String) {
    let active_host = {
        let state = context.state.read().await;
        state.active_host.clone()
    };

    let audio_device = match duetto_audio::device::get_device_by_id(&active_host, &id) {
        Ok(device) => device,
        Err(err) => {
            log::error!("Invalid audio device id {id}: {err}");
            None
        }
    };

    let Some(device) = audio_device else {
        log::error!("Could not find the target device at {id}");
        context
            .send_notification(NotificationType::Error, "The selected input device was not found.")
            .await;
        return;
    };

    let restart = {
        let mut state = context.state.write().await;
        log::info!("Selected input device {device}");
        state.active_audio_device = Some(device);
        state.config.audio_device_config.selected_device_id = Some(id);
        // persist the updated selection so it is remembered across runs
        if let Err(err) = crate::config::save_config(&state.config).await {
            log::error!("Failed to persist selected device: {err}");
        }
        state.transport.is_some()
    };

    if restart {
        super::transport_service::restart_transport(context).await;
    }
}
