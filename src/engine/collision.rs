//! Token vs barrier collision
//!
//! A token is a circle. Moves are checked at the destination only
//! (discrete, not a continuous sweep): the drag loop calls this on every
//! pointer move and once more on the snapped drop position.

use glam::Vec2;

use super::primitives::{Segment, closest_point_on_segment};

/// Contact between a circle and a segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    /// Closest point on the segment
    pub point: Vec2,
    /// Unit normal from the segment toward the circle center
    pub normal: Vec2,
    /// How far the circle overlaps the segment (0 when just touching)
    pub penetration: f32,
}

/// Contact between a circle and a segment, if they touch or overlap
pub fn circle_segment_contact(center: Vec2, radius: f32, seg: &Segment) -> Option<Contact> {
    if !(radius > 0.0) || !center.is_finite() {
        return None;
    }
    let closest = closest_point_on_segment(center, seg)?;
    let offset = center - closest;
    let dist_sq = offset.length_squared();
    if dist_sq > radius * radius {
        return None;
    }

    let dist = dist_sq.sqrt();
    let normal = if dist > 1.0e-6 {
        offset / dist
    } else {
        // Center sits on the segment; use its left-hand perpendicular
        seg.direction().perp().normalize_or_zero()
    };
    Some(Contact {
        point: closest,
        normal,
        penetration: radius - dist,
    })
}

/// First segment (by index) touched by a circle at `center`
pub fn first_contact(center: Vec2, radius: f32, segments: &[Segment]) -> Option<(usize, Contact)> {
    segments
        .iter()
        .enumerate()
        .find_map(|(i, seg)| circle_segment_contact(center, radius, seg).map(|c| (i, c)))
}

/// Would a token of `token_radius` overlap any movement-blocking segment
/// once at `to`?
pub fn would_collide(from: Vec2, to: Vec2, token_radius: f32, movement_segments: &[Segment]) -> bool {
    match first_contact(to, token_radius, movement_segments) {
        Some((index, contact)) => {
            log::trace!(
                "move {:?} -> {:?} blocked by segment {} (penetration {:.3})",
                from,
                to,
                index,
                contact.penetration
            );
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wall() -> Segment {
        Segment::new(Vec2::new(0.0, -50.0), Vec2::new(0.0, 50.0))
    }

    #[test]
    fn test_touching_counts_as_collision() {
        let segs = [wall()];
        assert!(would_collide(Vec2::new(40.0, 0.0), Vec2::new(10.0, 0.0), 10.0, &segs));
        assert!(!would_collide(Vec2::new(40.0, 0.0), Vec2::new(10.01, 0.0), 10.0, &segs));
    }

    #[test]
    fn test_no_segments_never_collides() {
        assert!(!would_collide(Vec2::ZERO, Vec2::new(5.0, 5.0), 10.0, &[]));
    }

    #[test]
    fn test_degenerate_token_never_collides() {
        let segs = [wall()];
        assert!(!would_collide(Vec2::ZERO, Vec2::ZERO, 0.0, &segs));
        assert!(!would_collide(Vec2::ZERO, Vec2::new(f32::NAN, 0.0), 10.0, &segs));
    }

    #[test]
    fn test_destination_only() {
        // Path crosses the wall but the destination is clear
        let segs = [wall()];
        assert!(!would_collide(Vec2::new(-100.0, 0.0), Vec2::new(100.0, 0.0), 10.0, &segs));
    }

    #[test]
    fn test_contact_normal_and_penetration() {
        let contact = circle_segment_contact(Vec2::new(6.0, 0.0), 10.0, &wall()).expect("overlap");
        assert!(contact.point.distance(Vec2::ZERO) < 1e-5);
        assert!(contact.normal.distance(Vec2::X) < 1e-5);
        assert!((contact.penetration - 4.0).abs() < 1e-5);
    }

    #[test]
    fn test_contact_center_on_segment() {
        let contact = circle_segment_contact(Vec2::new(0.0, 10.0), 5.0, &wall()).expect("overlap");
        assert!((contact.normal.length() - 1.0).abs() < 1e-5);
        assert!((contact.penetration - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_first_contact_index() {
        let segs = [
            Segment::new(Vec2::new(100.0, 0.0), Vec2::new(200.0, 0.0)),
            wall(),
        ];
        let (index, _) = first_contact(Vec2::new(3.0, 0.0), 5.0, &segs).expect("hits the wall");
        assert_eq!(index, 1);
    }
}
