use super::state::PendingEdit;
use super::*;
use crate::api::InMemoryApi;
use crate::bundle::MapBundle;
use crate::error::ApiError;
use crate::geometry::Point;
use crate::render::description_icon_center;
use crate::types::*;
use eframe::egui;
use std::rc::Rc;

/// Build an editor whose store already holds the scene, with one node at (200, 150).
fn editor() -> (BibMapApp, InMemoryApi, NodeId) {
    let api = InMemoryApi::new();
    let mut scene = Scene::new("Test map");
    let mut node = Node::new("A", (200.0, 150.0));
    node.description = Some("About A".into());
    let id = node.id;
    scene.nodes.push(node);
    api.insert_scene(scene.clone());

    let mut app = BibMapApp::new(Rc::new(api.clone()), scene);
    // keep screen offsets deterministic: no fit on first draw
    app.canvas.needs_fit = false;
    (app, api, id)
}

fn raw_input(events: Vec<egui::Event>) -> egui::RawInput {
    let mut raw = egui::RawInput::default();
    raw.screen_rect = Some(egui::Rect::from_min_size(
        egui::Pos2::ZERO,
        egui::vec2(1200.0, 800.0),
    ));
    raw.events = events;
    raw
}

/// Run a single headless egui frame with the provided input events and closure.
fn run_ui_with(
    ctx: &egui::Context,
    events: Vec<egui::Event>,
    mut f: impl FnMut(&egui::Context),
) -> egui::FullOutput {
    ctx.run(raw_input(events), |ctx| {
        ctx.set_visuals(egui::Visuals::dark());
        f(ctx);
    })
}

fn draw_canvas_frame(ctx: &egui::Context, app: &mut BibMapApp, events: Vec<egui::Event>) {
    let _ = run_ui_with(ctx, events, |ctx| {
        egui::CentralPanel::default().show(ctx, |ui| {
            app.draw_canvas(ui);
        });
    });
}

fn press(pos: egui::Pos2, pressed: bool) -> Vec<egui::Event> {
    vec![
        egui::Event::PointerMoved(pos),
        egui::Event::PointerButton {
            pos,
            button: egui::PointerButton::Primary,
            pressed,
            modifiers: egui::Modifiers::NONE,
        },
    ]
}

fn key(key: egui::Key, modifiers: egui::Modifiers) -> Vec<egui::Event> {
    vec![egui::Event::Key {
        key,
        physical_key: None,
        pressed: true,
        repeat: false,
        modifiers,
    }]
}

/// Press on `world`, then release there, over three frames of one context.
fn click_world(ctx: &egui::Context, app: &mut BibMapApp, world: Point) {
    draw_canvas_frame(ctx, app, Vec::new());
    let pos = app.world_to_screen(world);
    draw_canvas_frame(ctx, app, press(pos, true));
    draw_canvas_frame(ctx, app, press(pos, false));
}

#[test]
fn clicking_canvas_selects_node() {
    let (mut app, _api, id) = editor();
    let ctx = egui::Context::default();

    click_world(&ctx, &mut app, Point::new(275.0, 180.0));

    assert_eq!(app.interaction.selected_node(), Some(id));
}

#[test]
fn clicking_background_clears_selection() {
    let (mut app, _api, id) = editor();
    app.interaction.select_node(id);
    let ctx = egui::Context::default();

    click_world(&ctx, &mut app, Point::new(20.0, 20.0));

    assert_eq!(app.interaction.selected_node(), None);
}

#[test]
fn read_only_click_does_not_select_but_toggles_callout() {
    let (app, _api, id) = editor();
    let mut app = BibMapApp::new_read_only(app.api.clone(), app.model.scene().clone());
    app.canvas.needs_fit = false;
    let ctx = egui::Context::default();

    click_world(&ctx, &mut app, Point::new(275.0, 180.0));
    assert_eq!(app.interaction.selected_node(), None);
    assert_eq!(app.interaction.open_callout(), None);

    let icon = description_icon_center(app.model.node(id).unwrap());
    let ctx = egui::Context::default();
    click_world(&ctx, &mut app, icon);
    assert_eq!(app.interaction.open_callout(), Some(id));
    assert!(!app.model.has_unsent_changes());
}

#[test]
fn added_node_takes_store_id() {
    let (mut app, api, _) = editor();

    let local = app.add_node_at(10.0, 10.0);
    app.process_background(0.0);

    let selected = app.interaction.selected_node().unwrap();
    assert_ne!(selected, local);
    assert!(app.model.node(selected).is_some());
    let stored = api.scene(app.model.id()).unwrap();
    assert!(stored.node(selected).is_some());
    assert_eq!(stored.node(selected).unwrap().label, "Node 2");
}

#[test]
fn label_edits_are_saved_after_typing_settles() {
    let (mut app, api, id) = editor();
    let scene_id = app.model.id();

    for label in ["N", "Ne", "New"] {
        let patch = NodePatch {
            label: Some(label.to_string()),
            ..Default::default()
        };
        app.model.apply_node_patch(id, &patch);
        app.schedule_edit(id, PendingEdit::Node(patch));
    }
    assert_eq!(app.model.node(id).unwrap().label, "New");

    app.process_background(0.125);
    assert_eq!(api.scene(scene_id).unwrap().node(id).unwrap().label, "A");

    app.process_background(0.5);
    assert_eq!(api.scene(scene_id).unwrap().node(id).unwrap().label, "New");
    assert!(app.text_edits.is_empty());
}

#[test]
fn failed_save_shows_notification_and_keeps_local_change() {
    let (mut app, api, id) = editor();
    api.fail_next(ApiError::Rejected("offline".into()));

    app.model.move_node(id, 400.0, 300.0);
    app.process_background(1.0);

    assert_eq!(app.notifications.len(), 1);
    assert!(app.notifications[0].message.contains("offline"));
    let node = app.model.node(id).unwrap();
    assert_eq!((node.x, node.y), (400.0, 300.0));

    app.process_background(1.0 + crate::constants::NOTIFICATION_SECS + 0.5);
    assert!(app.notifications.is_empty());
}

#[test]
fn failed_publish_is_reverted() {
    let (mut app, api, _) = editor();
    api.fail_next(ApiError::Rejected("nope".into()));

    app.set_published(true);
    app.process_background(0.0);

    assert!(!app.model.scene().is_published);
    assert_eq!(app.notifications.len(), 1);
}

#[test]
fn escape_key_clears_selection() {
    let (mut app, _api, id) = editor();
    app.interaction.select_node(id);
    let ctx = egui::Context::default();

    let _ = run_ui_with(&ctx, key(egui::Key::Escape, egui::Modifiers::NONE), |ctx| {
        app.handle_canvas_keys(ctx);
    });

    assert_eq!(app.interaction.selected_node(), None);
}

#[test]
fn delete_key_removes_node_from_store() {
    let (mut app, api, id) = editor();
    app.interaction.select_node(id);
    let ctx = egui::Context::default();

    let _ = run_ui_with(&ctx, key(egui::Key::Delete, egui::Modifiers::NONE), |ctx| {
        app.handle_canvas_keys(ctx);
    });
    app.process_background(0.0);

    assert!(app.model.node(id).is_none());
    assert!(api.scene(app.model.id()).unwrap().nodes.is_empty());
}

#[test]
fn read_only_ignores_editing_keys() {
    let (app, _api, id) = editor();
    let mut app = BibMapApp::new_read_only(app.api.clone(), app.model.scene().clone());
    let ctx = egui::Context::default();

    let _ = run_ui_with(&ctx, key(egui::Key::Tab, egui::Modifiers::NONE), |ctx| {
        app.handle_canvas_keys(ctx);
    });
    let _ = run_ui_with(&ctx, key(egui::Key::Delete, egui::Modifiers::NONE), |ctx| {
        app.handle_canvas_keys(ctx);
    });

    assert_eq!(app.interaction.selected_node(), None);
    assert!(app.model.node(id).is_some());
}

#[test]
fn importing_bundle_adds_nodes_and_reloads() {
    let (mut app, _api, _) = editor();
    let mut other = Scene::new("Other");
    let a = Node::new("X", (0.0, 0.0));
    let b = Node::new("Y", (300.0, 0.0));
    other.connections.push(Connection::new(a.id, b.id));
    other.nodes.extend([a, b]);
    let json = MapBundle::from_scene(&other).to_json().unwrap();

    app.import_bundle_contents(&json);

    assert_eq!(app.model.nodes().len(), 3);
    assert_eq!(app.model.connections().len(), 1);
    assert!(app.canvas.needs_fit);
}

#[test]
fn malformed_bundle_is_reported() {
    let (mut app, _api, _) = editor();
    app.import_bundle_contents("{ not json");
    assert_eq!(app.notifications.len(), 1);
    assert_eq!(app.model.nodes().len(), 1);
}

#[test]
fn references_load_into_panel() {
    let (mut app, api, id) = editor();
    let tag = Tag::new("ecology", "#10B981");
    let patch = NodePatch {
        taxonomies: Some(vec![tag.clone()]),
        ..Default::default()
    };
    app.model.update_node(id, patch);
    app.process_background(0.0);
    let mut reference = Reference::new("smith2020", "article");
    reference.taxonomies.push(tag.clone());
    api.insert_reference(reference);
    let mut clip = Media::new("Wetlands", "https://example.org/wetlands");
    clip.taxonomies.push(tag);
    api.insert_media(clip);

    app.load_references(id);

    assert!(!app.references.loading);
    assert_eq!(app.references.items.len(), 1);
    assert_eq!(app.references.items[0].reference.bibtex_key, "smith2020");
    assert_eq!(app.references.media.len(), 1);
    assert_eq!(app.references.media[0].media.title, "Wetlands");
}

fn draw_panel_frame(ctx: &egui::Context, app: &mut BibMapApp) {
    let _ = run_ui_with(ctx, Vec::new(), |ctx| {
        egui::SidePanel::right("properties_panel").show(ctx, |ui| {
            app.draw_properties_panel(ui);
        });
    });
}

#[test]
fn properties_panel_draws_without_queuing_saves() {
    let (mut app, _api, id) = editor();
    app.add_node_at(400.0, 150.0);
    app.process_background(0.0);
    let other = app.interaction.selected_node().unwrap();
    app.model.add_connection(Connection::new(id, other));
    app.process_background(0.0);
    let connection = app.model.connections()[0].id;
    let ctx = egui::Context::default();

    app.interaction.select_node(id);
    draw_panel_frame(&ctx, &mut app);
    app.interaction.select_connection(connection);
    draw_panel_frame(&ctx, &mut app);
    app.interaction.clear();
    draw_panel_frame(&ctx, &mut app);

    assert!(!app.model.has_unsent_changes());
    assert!(app.text_edits.is_empty());
}

#[test]
fn editor_settings_round_trip() {
    let settings = EditorSettings {
        snap_to_grid: true,
        grid_size: 25.0,
        show_grid: false,
        dark_mode: false,
        properties_panel_width: 420.0,
    };
    let json = settings.to_json().unwrap();
    assert_eq!(EditorSettings::from_json(&json).unwrap(), settings);
    assert_eq!(
        EditorSettings::from_json("{\"dark_mode\": false}").unwrap(),
        EditorSettings {
            dark_mode: false,
            ..EditorSettings::default()
        }
    );
}
