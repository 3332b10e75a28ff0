use crate::types::Hand;

/// Wrist → finger base → tip chains for thumb, index, middle, ring and pinky.
pub const CONNECTIONS: [(usize, usize); 20] = [
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (0, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    (0, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    (0, 17),
    (17, 18),
    (18, 19),
    (19, 20),
];

#[derive(Clone, Copy, Debug)]
pub struct SkeletonStyle {
    pub line_color: [u8; 4],
    pub line_thickness: i32,
    pub point_color: [u8; 4],
    pub point_radius: i32,
}

impl SkeletonStyle {
    /// Drawn over live camera footage.
    pub const OVERLAY: SkeletonStyle = SkeletonStyle {
        line_color: [56, 189, 248, 255],
        line_thickness: 3,
        point_color: [248, 113, 113, 255],
        point_radius: 4,
    };

    /// Drawn on the blank playback canvas.
    pub const PLAYBACK: SkeletonStyle = SkeletonStyle {
        line_color: [255, 255, 255, 255],
        line_thickness: 2,
        point_color: [0, 0, 255, 255],
        point_radius: 3,
    };
}

/// Scales a hand's normalized coordinates into pixel space.
pub fn hand_to_pixels(hand: &Hand, width: u32, height: u32) -> Vec<(f32, f32)> {
    hand.landmarks
        .iter()
        .map(|lm| (lm.x * width as f32, lm.y * height as f32))
        .collect()
}

pub fn draw_hand(buffer: &mut [u8], width: u32, height: u32, hand: &Hand, style: &SkeletonStyle) {
    let points = hand_to_pixels(hand, width, height);
    draw_skeleton(buffer, width, height, &points, style);
}

pub fn draw_skeleton(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    points: &[(f32, f32)],
    style: &SkeletonStyle,
) {
    if points.len() < 2 {
        return;
    }

    for &(a, b) in &CONNECTIONS {
        if let (Some(pa), Some(pb)) = (points.get(a), points.get(b)) {
            draw_line(
                buffer,
                width,
                height,
                pa,
                pb,
                style.line_color,
                style.line_thickness,
            );
        }
    }

    for &(x, y) in points {
        draw_circle(
            buffer,
            width,
            height,
            (x as i32, y as i32),
            style.point_radius,
            style.point_color,
        );
    }
}

fn draw_line(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    p0: &(f32, f32),
    p1: &(f32, f32),
    color: [u8; 4],
    thickness: i32,
) {
    // Far out-of-frame points would make the walk below arbitrarily long.
    let limit = (width.max(height) as f32) * 4.0;
    let clamp = |v: f32| {
        if v.is_finite() {
            v.clamp(-limit, limit) as i32
        } else {
            0
        }
    };
    let (mut x0, mut y0) = (clamp(p0.0), clamp(p0.1));
    let (x1, y1) = (clamp(p1.0), clamp(p1.1));
    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let radius = (thickness.max(1) - 1) / 2;

    loop {
        put_pixel_safe(buffer, width, height, x0, y0, color);
        if radius > 0 {
            for ox in -radius..=radius {
                for oy in -radius..=radius {
                    if (ox != 0 || oy != 0) && ox.abs() + oy.abs() <= radius {
                        put_pixel_safe(buffer, width, height, x0 + ox, y0 + oy, color);
                    }
                }
            }
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn draw_circle(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    center: (i32, i32),
    radius: i32,
    color: [u8; 4],
) {
    let (cx, cy) = center;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                put_pixel_safe(buffer, width, height, cx + dx, cy + dy, color);
            }
        }
    }
}

fn put_pixel_safe(buffer: &mut [u8], width: u32, height: u32, x: i32, y: i32, color: [u8; 4]) {
    if x < 0 || y < 0 {
        return;
    }
    let (ux, uy) = (x as u32, y as u32);
    if ux >= width || uy >= height {
        return;
    }
    let idx = ((uy * width + ux) as usize) * 4;
    if idx + 3 < buffer.len() {
        buffer[idx..idx + 4].copy_from_slice(&color);
    }
}
