//! Integration tests for the GUI panel and app volume registries

mod common;

use common::{host_session, runtime};
use qar_streaming::scene::SceneObjectRef;
use qar_streaming::{
    AppVolumeInit, AppVolumeSize, Error, GuiPanelInit, GuiPanelSize, GuiPanelState, Pose,
    SceneEvent, Session, SessionCreateInit, SessionJoinInit,
};

fn panel(name: &str, width: f32, height: f32) -> GuiPanelInit {
    GuiPanelInit::new(name, GuiPanelSize::new(width, height))
}

fn volume(name: &str) -> AppVolumeInit {
    AppVolumeInit::new(name, AppVolumeSize::new(0.5, 0.5, 0.5))
}

// ============================================================================
// GUI panels
// ============================================================================

#[test]
fn test_added_panel_is_queryable_with_its_size() {
    let runtime = runtime();
    let (host, _) = host_session(&runtime, &SessionCreateInit::default());
    let panels = host.gui_panels();

    panels.add_panel(&panel("Browser", 1.2, 0.7)).unwrap();
    assert_eq!(panels.count(), 1);

    let handles = panels.query(8);
    assert_eq!(handles.len(), 1);
    assert_eq!(handles[0].size().unwrap(), GuiPanelSize::new(1.2, 0.7));
    assert_eq!(handles[0].display_name().unwrap(), "Browser");
    assert_eq!(handles[0].state().unwrap(), GuiPanelState::Visible);
}

#[test]
fn test_update_after_close_is_not_found() {
    let runtime = runtime();
    let (host, _) = host_session(&runtime, &SessionCreateInit::default());
    let panels = host.gui_panels();

    let id = panels.add_panel(&panel("Browser", 1.0, 1.0)).unwrap();
    let closed = panels.close_panel(id).unwrap();
    assert_eq!(closed.state.state, GuiPanelState::Closed);

    let err = panels.update_pose(id, Pose::at(1.0, 0.0, 0.0)).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "Got {:?}", err);
}

#[test]
fn test_closed_panel_disappears_everywhere() {
    let runtime = runtime();
    let (host, _) = host_session(&runtime, &SessionCreateInit::default());
    let panels = host.gui_panels();

    let keep = panels.add_panel(&panel("Keep", 1.0, 1.0)).unwrap();
    let gone = panels.add_panel(&panel("Gone", 1.0, 1.0)).unwrap();
    let stale = panels.handle(gone).unwrap();

    panels.close_panel(gone).unwrap();

    let listed: Vec<_> = panels.query(8).iter().map(|h| h.id().unwrap()).collect();
    assert_eq!(listed, vec![keep]);

    assert!(stale.is_stale());
    assert!(matches!(stale.pose(), Err(Error::NotFound(_))));
    assert!(matches!(stale.uri(), Err(Error::NotFound(_))));
    assert!(matches!(panels.get(gone), Err(Error::NotFound(_))));
    assert!(matches!(
        panels.change_size(gone, GuiPanelSize::new(2.0, 2.0)),
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        panels.set_state(gone, GuiPanelState::Minimized),
        Err(Error::NotFound(_))
    ));
    assert!(matches!(panels.close_panel(gone), Err(Error::NotFound(_))));
}

#[test]
fn test_guest_sees_host_changes() {
    let runtime = runtime();
    let (host, payload) = host_session(&runtime, &SessionCreateInit::default());
    let guest = Session::join(&SessionJoinInit::new(payload, "Guest")).unwrap();

    let id = host
        .gui_panels()
        .add_panel(&panel("Browser", 1.0, 0.5).with_uri("https://example.com/"))
        .unwrap();
    host.gui_panels()
        .navigate_to_uri(id, "https://example.com/docs")
        .unwrap();
    host.gui_panels()
        .set_state(id, GuiPanelState::Minimized)
        .unwrap();

    let seen = guest.gui_panels().handle(id).unwrap();
    assert_eq!(seen.uri().unwrap().as_deref(), Some("https://example.com/docs"));
    assert_eq!(seen.state().unwrap(), GuiPanelState::Minimized);

    // Either peer may close it
    guest.gui_panels().close_panel(id).unwrap();
    assert_eq!(host.gui_panels().count(), 0);
}

#[test]
fn test_invalid_panel_arguments() {
    let runtime = runtime();
    let (host, _) = host_session(&runtime, &SessionCreateInit::default());
    let panels = host.gui_panels();

    assert!(matches!(
        panels.add_panel(&panel("Flat", 0.0, 1.0)),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        panels.add_panel(&panel("", 1.0, 1.0)),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        panels.add_panel(&panel("Web", 1.0, 1.0).with_uri("not a uri")),
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(panels.count(), 0, "Failed adds leave nothing behind");

    let id = panels.add_panel(&panel("Browser", 1.0, 1.0)).unwrap();
    assert!(matches!(
        panels.set_state(id, GuiPanelState::Closed),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        panels.update_pose(id, Pose::at(f32::NAN, 0.0, 0.0)),
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(panels.get(id).unwrap().pose, Pose::default());
}

#[test]
fn test_panel_capacity() {
    let runtime = runtime();
    let (host, _) = host_session(
        &runtime,
        &SessionCreateInit::default().with_max_gui_panels(2),
    );
    let panels = host.gui_panels();

    let first = panels.add_panel(&panel("One", 1.0, 1.0)).unwrap();
    panels.add_panel(&panel("Two", 1.0, 1.0)).unwrap();
    assert!(matches!(
        panels.add_panel(&panel("Three", 1.0, 1.0)),
        Err(Error::CapacityExceeded(_))
    ));

    panels.close_panel(first).unwrap();
    let reused = panels.add_panel(&panel("Three", 1.0, 1.0)).unwrap();
    assert_ne!(reused, first, "Ids are never reused");
}

// ============================================================================
// App volumes
// ============================================================================

#[test]
fn test_query_respects_capacity() {
    let runtime = runtime();
    let (host, _) = host_session(&runtime, &SessionCreateInit::default());
    let volumes = host.app_volumes();

    for n in 0..5 {
        volumes.add_volume(&volume(&format!("Volume {}", n))).unwrap();
    }

    let mut out = vec![None, None, None];
    let written = volumes.query_into(&mut out);
    assert_eq!(written, 3);
    assert_eq!(volumes.count(), 5);
    assert!(out.iter().all(Option::is_some));

    assert_eq!(volumes.query(3).len(), 3);
    assert_eq!(volumes.query(10).len(), 5);
}

#[test]
fn test_query_lists_in_creation_order() {
    let runtime = runtime();
    let (host, _) = host_session(&runtime, &SessionCreateInit::default());
    let volumes = host.app_volumes();

    let ids: Vec<_> = (0..4)
        .map(|n| volumes.add_volume(&volume(&format!("Volume {}", n))).unwrap())
        .collect();
    volumes.close_volume(ids[1]).unwrap();
    let last = volumes.add_volume(&volume("Late")).unwrap();

    let listed: Vec<_> = volumes.query(10).iter().map(|h| h.id().unwrap()).collect();
    assert_eq!(listed, vec![ids[0], ids[2], ids[3], last]);
}

#[test]
fn test_volume_updates() {
    let runtime = runtime();
    let (host, _) = host_session(&runtime, &SessionCreateInit::default());
    let volumes = host.app_volumes();

    let id = volumes.add_volume(&volume("Volume")).unwrap();
    volumes.update_pose(id, Pose::at(1.0, 2.0, 3.0)).unwrap();
    volumes
        .change_size(id, AppVolumeSize::new(1.0, 2.0, 3.0))
        .unwrap();

    let snapshot = volumes.get(id).unwrap();
    assert_eq!(snapshot.pose, Pose::at(1.0, 2.0, 3.0));
    assert_eq!(snapshot.size, AppVolumeSize::new(1.0, 2.0, 3.0));

    let closed = volumes.close_volume(id).unwrap();
    assert_eq!(closed.display_name, "Volume");
    assert!(matches!(volumes.handle(id), Err(Error::NotFound(_))));
}

// ============================================================================
// Events and session lifetime
// ============================================================================

#[test]
fn test_scene_events_reach_every_handle() {
    let runtime = runtime();
    let (host, payload) = host_session(&runtime, &SessionCreateInit::default());
    let guest = Session::join(&SessionJoinInit::new(payload, "Guest")).unwrap();
    let mut events = guest.subscribe();

    let id = host.gui_panels().add_panel(&panel("Browser", 1.0, 1.0)).unwrap();
    host.gui_panels()
        .update_pose(id, Pose::at(0.0, 1.0, 0.0))
        .unwrap();
    host.gui_panels().close_panel(id).unwrap();

    let object = SceneObjectRef::GuiPanel(id);
    assert_eq!(events.try_recv().unwrap(), SceneEvent::Added(object));
    assert_eq!(events.try_recv().unwrap(), SceneEvent::Updated(object));
    assert_eq!(events.try_recv().unwrap(), SceneEvent::Closed(object));
    assert!(events.try_recv().is_err());
}

#[test]
fn test_objects_survive_creator_leaving() {
    let runtime = runtime();
    let (host, payload) = host_session(&runtime, &SessionCreateInit::default());
    let guest = Session::join(&SessionJoinInit::new(payload, "Guest")).unwrap();

    let id = guest.app_volumes().add_volume(&volume("Shared")).unwrap();
    guest.destroy();

    assert!(host.app_volumes().get(id).is_ok());
}

#[test]
fn test_runtime_destroy_closes_scene() {
    let runtime = runtime();
    let (host, _) = host_session(&runtime, &SessionCreateInit::default());
    let id = host.gui_panels().add_panel(&panel("Browser", 1.0, 1.0)).unwrap();
    let handle = host.gui_panels().handle(id).unwrap();

    runtime.destroy();

    assert!(handle.is_stale());
    assert_eq!(host.gui_panels().count(), 0);
    assert!(matches!(
        host.gui_panels().add_panel(&panel("Late", 1.0, 1.0)),
        Err(Error::NotFound(_))
    ));
}
