use macroquad::prelude::*;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use tower_motion::Pose;

use crate::routine::Waypoint;

pub fn window_conf() -> Conf {
    Conf {
        window_title: "Tower Takeover Motion Simulator".to_string(),
        window_width: 800,
        window_height: 600,
        high_dpi: true,
        ..Default::default()
    }
}

const VIS_SCALE: f32 = 2.0; // pixels per cm
const TRAIL_LEN: usize = 2000;

fn to_screen(x: f64, y: f64) -> Vec2 {
    Vec2::new(
        screen_width() / 2.0 + x as f32 * VIS_SCALE,
        screen_height() / 2.0 - y as f32 * VIS_SCALE,
    )
}

pub async fn run_visualization_loop(mut pose_rx: broadcast::Receiver<Arc<Pose>>, waypoints: Vec<Waypoint>) {
    let mut pose: Option<Pose> = None;
    let mut trail: Vec<Vec2> = Vec::new();

    info!("Visualization loop started.");

    loop {
        loop {
            match pose_rx.try_recv() {
                Ok(latest) => {
                    pose = Some(*latest);
                    if trail.len() == TRAIL_LEN {
                        trail.remove(0);
                    }
                    trail.push(Vec2::new(latest.x as f32, latest.y as f32));
                }
                Err(broadcast::error::TryRecvError::Empty) => break,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Visualization pose receiver lagged by {} messages.", n);
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    error!("Visualization pose channel closed. Exiting visualization loop.");
                    return;
                }
            }
        }

        clear_background(LIGHTGRAY);

        for (i, waypoint) in waypoints.iter().enumerate() {
            let p = to_screen(waypoint.x, waypoint.y);
            draw_circle(p.x, p.y, 6.0, if waypoint.backwards { ORANGE } else { RED });
            draw_text(&i.to_string(), p.x + 8.0, p.y - 8.0, 18.0, DARKGRAY);
        }

        for pair in trail.windows(2) {
            let a = to_screen(pair[0].x as f64, pair[0].y as f64);
            let b = to_screen(pair[1].x as f64, pair[1].y as f64);
            draw_line(a.x, a.y, b.x, b.y, 1.5, GRAY);
        }

        if let Some(pose) = pose {
            let center = to_screen(pose.x, pose.y);
            // screen y points down
            let th = -pose.heading_radians() as f32;
            let r_size = 15.0;
            let corner = |offset: f32| {
                Vec2::new(
                    center.x + r_size * (th + offset).cos(),
                    center.y + r_size * (th + offset).sin(),
                )
            };
            let nose = corner(0.0);
            draw_triangle(
                nose,
                corner(2.0 * std::f32::consts::PI / 3.0),
                corner(-2.0 * std::f32::consts::PI / 3.0),
                BLUE,
            );
            draw_line(center.x, center.y, nose.x, nose.y, 2.0, DARKBLUE);
            draw_text(&format!("Robot: {}", pose), 10.0, 20.0, 20.0, BLACK);
        } else {
            draw_text("Waiting for pose estimate...", 10.0, 20.0, 20.0, BLACK);
        }

        next_frame().await
    }
}
