use wgpu_deferred::renderer::draw_key::{
    quantize_depth, DrawKey, DEPTH_ID_LIMIT, MATERIAL_ID_LIMIT, PROGRAM_ID_LIMIT,
};
use wgpu_deferred::renderer::pipelines::PipelineId;

fn opaque(program: PipelineId, material: u32, distance: f32) -> DrawKey {
    DrawKey::new(
        false,
        program.program_id(),
        material,
        quantize_depth(distance, 0.1, 100.0),
    )
}

fn transparent(material: u32, distance: f32) -> DrawKey {
    DrawKey::new(
        true,
        PipelineId::Transparent.program_id(),
        material,
        quantize_depth(distance, 0.1, 100.0),
    )
}

#[test]
fn every_opaque_key_sorts_before_every_transparent_key() {
    let mut keys = vec![
        transparent(0, 1.0),
        opaque(PipelineId::OpaqueDoubleSided, 900, 99.0),
        transparent(3, 50.0),
        opaque(PipelineId::Opaque, 1, 0.5),
    ];
    keys.sort();

    let first_transparent = keys
        .iter()
        .position(|key| key.is_transparent())
        .expect("transparent keys present");
    assert_eq!(first_transparent, 2);
    assert!(keys[first_transparent..].iter().all(|key| key.is_transparent()));
}

#[test]
fn opaque_keys_group_by_program_then_material_then_front_to_back() {
    let mut keys = vec![
        opaque(PipelineId::OpaqueDoubleSided, 0, 1.0),
        opaque(PipelineId::Opaque, 2, 1.0),
        opaque(PipelineId::Opaque, 1, 30.0),
        opaque(PipelineId::Opaque, 1, 3.0),
    ];
    keys.sort();

    let order: Vec<(u32, u32)> = keys
        .iter()
        .map(|key| (key.program_id(), key.material_id()))
        .collect();
    let program = PipelineId::Opaque.program_id();
    assert_eq!(
        order,
        vec![
            (program, 1),
            (program, 1),
            (program, 2),
            (PipelineId::OpaqueDoubleSided.program_id(), 0),
        ]
    );
    assert!(keys[0].depth_id() < keys[1].depth_id());
}

#[test]
fn transparent_keys_sort_back_to_front_regardless_of_material() {
    let mut keys = vec![
        transparent(0, 2.0),
        transparent(7, 40.0),
        transparent(3, 10.0),
    ];
    keys.sort();

    let materials: Vec<u32> = keys.iter().map(|key| key.material_id()).collect();
    assert_eq!(materials, vec![7, 3, 0]);
}

#[test]
fn keys_serialize_as_bare_integers() {
    let key = opaque(PipelineId::Opaque, 42, 12.5);
    let json = serde_json::to_string(&key).expect("serialize key");
    assert_eq!(json, key.bits().to_string());

    let back: DrawKey = serde_json::from_str(&json).expect("deserialize key");
    assert_eq!(back, key);
    assert_eq!(
        PipelineId::from_program_id(back.program_id()),
        Some(PipelineId::Opaque)
    );
}

#[test]
fn fields_read_back_what_was_packed() {
    let edges = [
        (0, 0, 0),
        (PROGRAM_ID_LIMIT - 1, MATERIAL_ID_LIMIT - 1, DEPTH_ID_LIMIT - 1),
        (4095, (1 << 24) - 1, (1 << 24) - 1),
        (17, 1, (1 << 24) - 2),
    ];
    for transparent in [false, true] {
        for (program, material, depth) in edges {
            let key = DrawKey::new(transparent, program, material, depth);
            assert_eq!(key.is_transparent(), transparent);
            assert_eq!(key.program_id(), program);
            assert_eq!(key.material_id(), material);
            assert_eq!(key.depth_id(), depth);
        }
    }
}

#[test]
fn lower_program_sorts_first_whatever_the_material_and_depth() {
    let low = DrawKey::new(false, 3, MATERIAL_ID_LIMIT - 1, DEPTH_ID_LIMIT - 1);
    let high = DrawKey::new(false, 4, 0, 0);
    assert!(low < high);

    let mut keys = vec![high, low];
    keys.sort();
    assert_eq!(keys, vec![low, high]);
}
