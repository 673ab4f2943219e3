use glam::Vec3;

/// Remap `input` from one range to another. Inputs outside the input range
/// clamp to the ends of the output range. An empty input range is a step at
/// `input_max`.
pub fn map_to_range(
    input: f32,
    input_min: f32,
    input_max: f32,
    output_min: f32,
    output_max: f32,
) -> f32 {
    if input_max.is_nan() || input_min.is_nan() || input_max <= input_min {
        return if input >= input_max { output_max } else { output_min };
    }
    let input = input.clamp(input_min, input_max);
    let normal = (input - input_min) / (input_max - input_min);
    (output_max - output_min) * normal + output_min
}

/// Distance between two points on the ice plane (XZ), ignoring height.
pub fn planar_distance(a: Vec3, b: Vec3) -> f32 {
    let dx = a.x - b.x;
    let dz = a.z - b.z;
    (dx * dx + dz * dz).sqrt()
}

/// Planar speed of a velocity vector.
pub fn planar_speed(v: Vec3) -> f32 {
    (v.x * v.x + v.z * v.z).sqrt()
}

/// Heading of a velocity on the ice, in degrees within [0, 360).
/// 0 points down the sheet (+Z), 90 points toward +X.
pub fn heading_degrees(v: Vec3) -> f32 {
    v.x.atan2(v.z).to_degrees().rem_euclid(360.0)
}
