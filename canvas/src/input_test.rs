#![allow(clippy::float_cmp)]

use super::*;

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn draft(tool: Tool, x: f64, y: f64) -> Element {
    begin_draft(tool, "d".to_owned(), Point::new(x, y), &Style::default()).unwrap()
}

// =============================================================
// Tool
// =============================================================

#[test]
fn tool_default_is_select() {
    assert_eq!(Tool::default(), Tool::Select);
    assert!(Tool::Select.element_kind().is_none());
}

#[test]
fn tool_kind_round_trip() {
    for kind in ElementKind::ALL {
        assert_eq!(Tool::for_kind(kind).element_kind(), Some(kind));
    }
}

#[test]
fn tool_parse_accepts_kind_names() {
    assert_eq!(Tool::parse("select"), Some(Tool::Select));
    assert_eq!(Tool::parse("diamond"), Some(Tool::Diamond));
    assert_eq!(Tool::parse("eraser"), None);
}

#[test]
fn only_pencil_stays_active() {
    assert!(Tool::Pencil.stays_active());
    assert!(!Tool::Rectangle.stays_active());
    assert!(!Tool::Text.stays_active());
}

#[test]
fn tool_categories() {
    assert!(Tool::Polygon.is_box());
    assert!(!Tool::Line.is_box());
    assert!(Tool::Sticky.places_on_click());
    assert!(!Tool::Pencil.places_on_click());
}

#[test]
fn gesture_default_is_idle() {
    assert!(matches!(Gesture::default(), Gesture::Idle));
}

// =============================================================
// Shortcuts
// =============================================================

fn key(name: &str) -> Key {
    Key(name.to_owned())
}

const CMD: Modifiers = Modifiers { shift: false, ctrl: false, alt: false, meta: true };
const CTRL_SHIFT: Modifiers = Modifiers { shift: true, ctrl: true, alt: false, meta: false };

#[test]
fn delete_keys_need_no_modifier() {
    assert_eq!(shortcut(&key("Delete"), Modifiers::default()), Some(Command::DeleteSelection));
    assert_eq!(shortcut(&key("Backspace"), Modifiers::default()), Some(Command::DeleteSelection));
}

#[test]
fn undo_redo_shortcuts() {
    assert_eq!(shortcut(&key("z"), CMD), Some(Command::Undo));
    assert_eq!(shortcut(&key("Z"), CTRL_SHIFT), Some(Command::Redo));
    assert_eq!(shortcut(&key("y"), CMD), Some(Command::Redo));
    assert_eq!(shortcut(&key("z"), Modifiers::default()), None);
}

#[test]
fn group_shortcuts() {
    assert_eq!(shortcut(&key("g"), CMD), Some(Command::Group));
    assert_eq!(shortcut(&key("G"), CTRL_SHIFT), Some(Command::Ungroup));
}

#[test]
fn escape_cancels() {
    assert_eq!(shortcut(&key("Escape"), CMD), Some(Command::Cancel));
    assert_eq!(shortcut(&key("q"), CMD), None);
}

// =============================================================
// Drafts
// =============================================================

#[test]
fn select_tool_has_no_draft() {
    assert!(begin_draft(Tool::Select, "x".into(), Point::new(0.0, 0.0), &Style::default()).is_none());
}

#[test]
fn rectangle_draft_normalizes_reverse_drag() {
    let mut d = draft(Tool::Rectangle, 100.0, 100.0);
    update_draft(&mut d, Point::new(100.0, 100.0), Point::new(40.0, 70.0));
    assert_eq!((d.x, d.y), (40.0, 70.0));
    assert_eq!((d.width, d.height), (Some(60.0), Some(30.0)));
}

#[test]
fn rectangle_draft_commits_only_when_large_enough() {
    let start = Point::new(0.0, 0.0);
    let mut small = draft(Tool::Rectangle, 0.0, 0.0);
    update_draft(&mut small, start, Point::new(5.0, 50.0));
    assert!(finish_draft(small).is_none());

    let mut big = draft(Tool::Rectangle, 0.0, 0.0);
    update_draft(&mut big, start, Point::new(6.0, 6.0));
    let el = finish_draft(big).unwrap();
    assert_eq!(el.width, Some(6.0));
}

#[test]
fn click_without_drag_discards_box() {
    assert!(finish_draft(draft(Tool::Circle, 10.0, 10.0)).is_none());
}

#[test]
fn line_draft_tracks_two_points() {
    let start = Point::new(1.0, 2.0);
    let mut d = draft(Tool::Arrow, 1.0, 2.0);
    update_draft(&mut d, start, Point::new(10.0, 10.0));
    update_draft(&mut d, start, Point::new(20.0, 30.0));
    assert_eq!(d.points.as_deref().unwrap(), &[start, Point::new(20.0, 30.0)]);
    assert!(finish_draft(d).is_some());
}

#[test]
fn pencil_draft_appends_every_sample() {
    let start = Point::new(0.0, 0.0);
    let mut d = draft(Tool::Pencil, 0.0, 0.0);
    update_draft(&mut d, start, Point::new(1.0, 1.0));
    update_draft(&mut d, start, Point::new(2.0, 3.0));
    assert_eq!(d.points.as_ref().unwrap().len(), 3);
}

#[test]
fn text_and_sticky_drafts_are_complete() {
    let text = draft(Tool::Text, 5.0, 6.0);
    assert_eq!(text.text.as_deref(), Some("Text"));
    assert_eq!(text.font_size, Some(28.0));
    let sticky = draft(Tool::Sticky, 0.0, 0.0);
    assert_eq!(sticky.width, Some(150.0));
    assert_eq!(sticky.fill_color.as_deref(), Some("#fef3c7"));
    assert!(finish_draft(sticky).is_some());
}

#[test]
fn draft_takes_current_style() {
    let style = Style { stroke_color: "#ff0000".into(), ..Style::default() };
    let d = begin_draft(Tool::Line, "l".into(), Point::new(0.0, 0.0), &style).unwrap();
    assert_eq!(d.stroke_color.as_deref(), Some("#ff0000"));
    assert!(d.fill_color.is_none());
}

// =============================================================
// Polygon
// =============================================================

#[test]
fn polygon_becomes_hexagon_in_drag_box() {
    let start = Point::new(0.0, 0.0);
    let mut d = draft(Tool::Polygon, 0.0, 0.0);
    update_draft(&mut d, start, Point::new(100.0, 60.0));
    let el = finish_draft(d).unwrap();
    let points = el.points.unwrap();
    assert_eq!(points.len(), 6);
    assert!(el.width.is_none());
    // First vertex straight above the center at radius 30.
    assert!(approx(points[0].x, 50.0));
    assert!(approx(points[0].y, 0.0));
    for p in &points {
        let r = ((p.x - 50.0).powi(2) + (p.y - 30.0).powi(2)).sqrt();
        assert!(approx(r, 30.0));
    }
}

#[test]
fn regular_polygon_clamps_sides() {
    assert_eq!(regular_polygon(Bounds::from_rect(0.0, 0.0, 10.0, 10.0), 1).len(), 3);
}

// =============================================================
// Marquee
// =============================================================

#[test]
fn drag_bounds_orders_corners() {
    let b = drag_bounds(Point::new(10.0, 0.0), Point::new(0.0, 10.0));
    assert_eq!(b, Bounds::from_rect(0.0, 0.0, 10.0, 10.0));
}

#[test]
fn tiny_marquee_is_ignored() {
    assert!(!is_meaningful_marquee(&Bounds::from_rect(0.0, 0.0, 2.0, 2.0)));
    assert!(is_meaningful_marquee(&Bounds::from_rect(0.0, 0.0, 20.0, 2.0)));
}
