use tower_kinematics::*;

fn main() {
    let wheel_diameter = 10.16;
    let track_width = 30.0;
    let ticks_per_revolution = 900.0;
    let kinematics_result = DifferentialDrive::new(wheel_diameter, track_width, ticks_per_revolution);

    let mut current_pose = Pose::new(0.0, 0.0, 0.0);
    let mut ticks = WheelTicks::default();
    let per_step = WheelTicks::new(90.0, 90.0); // both wheels a tenth of a revolution
    let num_steps = 10;

    match kinematics_result {
        Ok(kinematics) => {
            println!("Initializing dead reckoning...");
            println!("  Chassis: {}", kinematics);
            println!("  Initial Pose: {}", current_pose);
            println!("  Ticks per step: {}", per_step);

            for i in 0..num_steps {
                let previous = ticks;
                ticks = WheelTicks::new(ticks.left + per_step.left, ticks.right + per_step.right);
                current_pose = kinematics.update_pose_from_ticks(current_pose, ticks.since(previous));
                println!("Step {:>2}: Pose: {}", i + 1, current_pose);
            }

            println!("\nFinal Pose: {:?}", current_pose);
        }
        Err(e) => {
            eprintln!("Failed to initialize kinematics: {}", e);
        }
    }
}
