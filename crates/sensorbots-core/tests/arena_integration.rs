use sensorbots_core::sensors::{
    BinaryLandmarkCamera, CompositeCamera, FourWayMicrophone, GroundSensor, InfraredSensor,
    Microphone, RadioTransceiver, RotatingDistanceRing, flat_response,
};
use sensorbots_core::{
    Arena, Body, BodyId, BodyState, Color, CompositeCameraConfig, DriveConfig, GroundField,
    GroundSensorConfig, InteractionHandle, MicrophoneConfig, Pose, SimConfig, SoundSourceConfig,
    Tick, Vector,
};
use std::f64::consts::PI;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sensorbots_core=warn")),
        )
        .with_test_writer()
        .try_init();
}

fn config(walls: bool, seed: u64) -> SimConfig {
    SimConfig {
        world_width: 200.0,
        world_height: 200.0,
        walls,
        rng_seed: Some(seed),
        ..SimConfig::default()
    }
}

fn robot(arena: &Arena, x: f64, y: f64, heading: f64) -> (Body, InteractionHandle) {
    let mut body = Body::new(BodyState::at(Vector::new(x, y), heading).with_height(20.0));
    let ring = RotatingDistanceRing::new(arena.config().bumper_ring.clone()).expect("ring");
    let handle = body.add_local(ring);
    body.attach_drive(arena.config().drive.clone()).expect("drive");
    (body, handle)
}

fn bumpers(arena: &Arena, id: BodyId, handle: InteractionHandle) -> Vec<f64> {
    arena
        .body(id)
        .expect("body")
        .local::<RotatingDistanceRing>(handle)
        .expect("ring")
        .virtual_bumpers()
        .to_vec()
}

fn run_scene(seed: u64) -> Vec<(Vector, f64, Vec<f64>)> {
    let mut arena = Arena::new(config(true, seed)).expect("arena");
    let mut robots = Vec::new();
    for (i, (x, y)) in [(40.0, 40.0), (60.0, 45.0), (150.0, 150.0), (185.0, 100.0)]
        .into_iter()
        .enumerate()
    {
        let (mut body, handle) = robot(&arena, x, y, i as f64 * 0.7);
        body.drive_mut().expect("drive").set_speeds(12.0, 8.0 + i as f64);
        robots.push((arena.add_body(body), handle));
    }
    for _ in 0..25 {
        arena.step(0.1).expect("step");
    }
    robots
        .iter()
        .map(|&(id, handle)| {
            let state = &arena.body(id).expect("body").state;
            (state.pose.position, state.pose.heading, bumpers(&arena, id, handle))
        })
        .collect()
}

#[test]
fn same_seed_replays_identically() {
    init_tracing();
    let first = run_scene(42);
    let second = run_scene(42);
    assert_eq!(first, second);
    let other = run_scene(43);
    assert_ne!(first, other);
}

#[test]
fn radios_exchange_in_range_and_stay_silent_out_of_range() {
    init_tracing();
    let mut arena = Arena::new(config(false, 5)).expect("arena");
    let radio = arena.config().radio.clone();
    let mut ids = Vec::new();
    for (x, payload) in [(20.0, b"a"), (50.0, b"b"), (180.0, b"c")] {
        let mut body = Body::new(BodyState::at(Vector::new(x, 100.0), 0.0));
        body.attach_radio(&radio).expect("radio");
        body.ports.radio.as_mut().expect("link").set_message(payload.to_vec());
        ids.push(arena.add_body(body));
    }
    arena.step(0.1).expect("step");

    let link = |id: BodyId| arena.body(id).expect("body").ports.radio.clone().expect("link");
    let (a, b, c) = (link(ids[0]), link(ids[1]), link(ids[2]));
    assert!(a.was_communication() && b.was_communication());
    assert!(!a.received().is_empty());
    assert!(a.received().iter().all(|m| m.sender == ids[1] && m.payload == b"b"));
    assert!(b.received().iter().all(|m| m.sender == ids[0] && m.payload == b"a"));
    // Both transceivers run the exchange, so each side hears the other once per direction.
    assert_eq!(a.received().len(), 2);
    assert_eq!(b.received().len(), 2);
    assert!(c.received().is_empty());
    assert!(!c.was_communication());
    // Transmitting is reported even with nobody in range.
    assert!(c.was_communication_sent());
    assert!(!c.payload_delivered());
}

#[test]
fn contact_flag_follows_the_last_evaluated_peer() {
    init_tracing();
    let mut arena = Arena::new(config(false, 8)).expect("arena");
    let radio = arena.config().radio.clone();
    let mut ids = Vec::new();
    // The outer pair is 104 apart: inside the reach (range plus radius) but past any
    // jittered threshold, which never exceeds the range.
    for (x, payload) in [(10.0, b"a"), (40.0, b"b"), (114.0, b"c")] {
        let mut body = Body::new(BodyState::at(Vector::new(x, 100.0), 0.0));
        body.attach_radio(&radio).expect("radio");
        body.ports.radio.as_mut().expect("link").set_message(payload.to_vec());
        ids.push(arena.add_body(body));
    }
    arena.step(0.1).expect("step");

    let link = |id: BodyId| arena.body(id).expect("body").ports.radio.clone().expect("link");
    let (a, b, c) = (link(ids[0]), link(ids[1]), link(ids[2]));
    // The last body to run its transceiver evaluates the far peer last and clears both flags.
    assert!(!a.received().is_empty());
    assert!(a.received().iter().all(|m| m.sender == ids[1]));
    assert!(!a.was_communication());
    assert!(!c.received().is_empty());
    assert!(!c.was_communication());
    assert!(b.was_communication());
}

#[test]
fn composite_camera_sees_a_body_ahead_in_the_fused_buffer() {
    init_tracing();
    let mut arena = Arena::new(config(false, 1)).expect("arena");
    let mut observer = Body::new(BodyState::at(Vector::new(100.0, 100.0), 0.0));
    let camera = CompositeCamera::new(CompositeCameraConfig {
        half_pixel_count: 10,
        ..CompositeCameraConfig::default()
    })
    .expect("camera");
    let handle = observer.add_local(camera);
    let observer = arena.add_body(observer);
    let red = Color::new(1.0, 0.0, 0.0);
    arena.add_body(Body::new(
        BodyState::at(Vector::new(130.0, 100.0), 0.0).with_color(red),
    ));
    arena.step(0.1).expect("step");

    let camera = arena
        .body(observer)
        .expect("body")
        .local::<CompositeCamera>(handle)
        .expect("camera");
    assert_eq!(camera.pixel_count(), 20);
    // Straight ahead is the last pixel of the first half and the first of the second.
    for pixel in [9, 10] {
        assert_eq!(camera.color(pixel), Ok(red));
        assert!((camera.distance(pixel).expect("pixel") - 30.0).abs() < 1e-9);
    }
    assert!(camera.distance(0).expect("pixel").is_infinite());
    let [first, second] = camera.halves();
    assert_eq!(&camera.image()[..10], first.image());
    assert_eq!(&camera.image()[10..], second.image());
}

#[test]
fn drive_moves_the_body_and_teleport_resets_odometry() {
    init_tracing();
    let mut arena = Arena::new(config(false, 9)).expect("arena");
    let mut body = Body::new(BodyState::at(Vector::new(50.0, 50.0), 0.0));
    body.attach_drive(DriveConfig {
        noise_amount: 0.0,
        ..DriveConfig::default()
    })
    .expect("drive");
    body.drive_mut().expect("drive").set_speeds(10.0, 10.0);
    let id = arena.add_body(body);
    for _ in 0..10 {
        arena.step(0.1).expect("step");
    }
    assert_eq!(arena.tick(), Tick(10));
    let body = arena.body(id).expect("body");
    assert!((body.state.pose.position.x - 60.0).abs() < 1e-9);
    assert!((body.state.pose.position.y - 50.0).abs() < 1e-12);
    let drive = body.drive().expect("drive");
    assert!((drive.left_odometry() - 10.0).abs() < 1e-9);

    arena
        .teleport(id, Pose::new(Vector::new(20.0, 20.0), PI))
        .expect("teleport");
    let drive = arena.body(id).expect("body").drive().expect("drive");
    assert_eq!(drive.left_odometry(), 0.0);
    assert_eq!(drive.right_odometry(), 0.0);

    // Spinning on the spot turns counter-clockwise when the right wheel leads.
    let body = arena.body_mut(id).expect("body");
    body.drive_mut().expect("drive").set_speeds(-5.0, 5.0);
    arena.step(0.1).expect("step");
    let state = &arena.body(id).expect("body").state;
    let expected = sensorbots_core::normalize_angle(PI + 10.0 / 15.0 * 0.1);
    assert!((state.pose.heading - expected).abs() < 1e-12);
}

#[test]
fn bumper_ring_reads_a_nearby_wall() {
    init_tracing();
    let mut arena = Arena::new(config(true, 3)).expect("arena");
    let (body, handle) = robot(&arena, 190.0, 100.0, 0.0);
    let id = arena.add_body(body);
    let report = arena.step(0.0).expect("step");
    assert_eq!(report.walls_steps, 1);

    let readings = bumpers(&arena, id, handle);
    assert_eq!(readings.len(), 24);
    // Centre 10 from the east wall, radius 8.5: the front bumper sees 1.5.
    let expected = 4526.0 * (-0.9994f64 * 1.5).exp();
    assert!((expected * 0.97..expected * 1.03).contains(&readings[0]), "{}", readings[0]);
    // Facing away from the wall the nearest surface is 190 away.
    assert!(readings[12] < 20.0 * 1.03);
}

#[test]
fn infrared_sensors_see_walls_and_neighbours() {
    init_tracing();
    let mut arena = Arena::new(config(true, 12)).expect("arena");
    let ir = arena.config().infrared.clone();
    let mut near_wall = Body::new(BodyState::at(Vector::new(190.0, 100.0), 0.0));
    let wall_sensor = near_wall.add_local(InfraredSensor::new(ir.clone()).expect("ir"));
    let near_wall = arena.add_body(near_wall);

    let mut facing = Body::new(BodyState::at(Vector::new(60.0, 60.0), 0.0));
    let body_sensor = facing.add_local(InfraredSensor::new(ir.clone()).expect("ir"));
    let facing = arena.add_body(facing);
    // Straight down the sensor axis, 6 past the sensor plus the obstacle radius.
    let mount = Pose::new(Vector::new(60.0, 60.0), 0.0).to_world(ir.offset);
    let obstacle = mount + Vector::new(ir.orientation.cos(), ir.orientation.sin()) * 11.0;
    arena.add_body(Body::new(BodyState::at(obstacle, 0.0).with_radius(5.0)));
    arena.step(0.0).expect("step");

    let sensor = |id: BodyId, handle: InteractionHandle| {
        arena
            .body(id)
            .expect("body")
            .local::<InfraredSensor>(handle)
            .expect("ir")
            .clone()
    };
    // Mounted 3 ahead of a centre 10 from the east wall, angled 16° off the heading.
    let at_wall = sensor(near_wall, wall_sensor);
    assert!((at_wall.distance() - 7.0 / ir.orientation.cos()).abs() < 1e-9);
    assert!(at_wall.value() > 0.0);

    let at_body = sensor(facing, body_sensor);
    assert!((at_body.distance() - 6.0).abs() < 1e-9);
}

#[test]
fn ground_sensor_reads_the_raster_under_it() {
    init_tracing();
    let mut arena = Arena::new(config(false, 2)).expect("arena");
    let black = Color::BLACK;
    let white = Color::WHITE;
    let ground = GroundField::raster(2, 1, vec![black, white], black).expect("raster");
    arena.surroundings_mut().set_ground(ground);

    let sensor_config = GroundSensorConfig {
        noise_sd: 0.0,
        ..GroundSensorConfig::default()
    };
    let mut handles = Vec::new();
    for x in [50.0, 150.0] {
        let mut body = Body::new(BodyState::at(Vector::new(x, 100.0), 0.0));
        let handle = body.add_local(GroundSensor::new(sensor_config.clone()).expect("sensor"));
        handles.push((arena.add_body(body), handle));
    }
    arena.step(0.1).expect("step");
    let value = |(id, handle): (BodyId, InteractionHandle)| {
        arena
            .body(id)
            .expect("body")
            .local::<GroundSensor>(handle)
            .expect("sensor")
            .value()
    };
    let on_black = value(handles[0]);
    let on_white = value(handles[1]);
    let sensor = GroundSensor::new(sensor_config).expect("sensor");
    assert!((on_black - sensor.response(0.0)).abs() < 1e-9);
    assert!((on_white - sensor.response(1.0)).abs() < 1e-9);
}

#[test]
fn changing_a_range_reorders_local_evaluation() {
    init_tracing();
    let mut body = Body::new(BodyState::default());
    let radio = body.attach_radio(&Default::default()).expect("radio");
    let camera =
        body.add_local(CompositeCamera::new(CompositeCameraConfig::default()).expect("camera"));
    assert_eq!(body.local_handles().collect::<Vec<_>>(), [camera, radio]);

    body.with_local_mut::<CompositeCamera, _>(camera, |cam| cam.set_range(10.0))
        .expect("camera")
        .expect("range");
    assert_eq!(body.local_handles().collect::<Vec<_>>(), [radio, camera]);
    assert_eq!(body.max_local_range(), Some(100.0));

    body.with_local_mut::<RadioTransceiver, _>(radio, |r| r.set_range(5.0))
        .expect("radio")
        .expect("range");
    assert_eq!(body.local_handles().collect::<Vec<_>>(), [camera, radio]);
}

#[test]
fn landmark_camera_and_microphone_in_one_world() {
    init_tracing();
    let mut arena = Arena::new(config(true, 4)).expect("arena");
    let mut listener = Body::new(BodyState::at(Vector::new(100.0, 100.0), PI / 2.0));
    let landmark = listener.add_global(
        BinaryLandmarkCamera::new(arena.config().landmark_camera.clone()).expect("landmark"),
    );
    let microphone = listener.add_local(
        Microphone::new(MicrophoneConfig {
            channels: 5,
            ..MicrophoneConfig::default()
        })
        .expect("mic"),
    );
    let listener = arena.add_body(listener);

    let mut speaker = Body::new(BodyState::at(Vector::new(103.0, 104.0), 0.0));
    speaker
        .attach_speaker(&SoundSourceConfig {
            channels: 5,
            ..SoundSourceConfig::default()
        })
        .expect("speaker");
    speaker
        .ports
        .speaker
        .as_mut()
        .expect("speaker")
        .set_sound(3, 26.0)
        .expect("channel");
    arena.add_body(speaker);
    arena.step(0.1).expect("step");

    let body = arena.body(listener).expect("body");
    let camera = body.global::<BinaryLandmarkCamera>(landmark).expect("landmark");
    assert!(camera.port() && camera.starboard());
    let mic = body.local::<Microphone>(microphone).expect("mic");
    // Distance 5: 26 / (1 + 25) = 1.
    assert_eq!(mic.max_channel(), Some((3, 1.0)));
}

#[test]
fn microphones_hear_past_the_emitters_advertised_range() {
    init_tracing();
    let mut arena = Arena::new(config(false, 6)).expect("arena");
    let mic_config = MicrophoneConfig {
        channels: 3,
        range: 100.0,
        ..MicrophoneConfig::default()
    };
    let mut listener = Body::new(BodyState::at(Vector::new(50.0, 100.0), 0.0));
    let single = listener.add_local(
        Microphone::with_response(mic_config.clone(), flat_response).expect("mic"),
    );
    let four_way = listener
        .add_local(FourWayMicrophone::with_response(mic_config, flat_response).expect("mic"));
    let listener = arena.add_body(listener);

    let mut speaker = Body::new(BodyState::at(Vector::new(110.0, 100.0), 0.0));
    speaker
        .attach_speaker(&SoundSourceConfig {
            channels: 3,
            range: 50.0,
            ..SoundSourceConfig::default()
        })
        .expect("speaker");
    speaker
        .ports
        .speaker
        .as_mut()
        .expect("speaker")
        .set_sound(1, 4.0)
        .expect("channel");
    arena.add_body(speaker);
    arena.step(0.1).expect("step");

    let body = arena.body(listener).expect("body");
    let mic = body.local::<Microphone>(single).expect("mic");
    assert_eq!(mic.max_channel(), Some((1, 4.0)));
    let four_way = body.local::<FourWayMicrophone>(four_way).expect("mic");
    // Ahead of the listener the front mounts tie and the first one wins.
    assert_eq!(four_way.max_channel(0), Ok(Some((1, 4.0))));
    assert_eq!(four_way.max_channel(1), Ok(None));
}

#[test]
fn json_configuration_drives_an_arena() {
    init_tracing();
    let config = SimConfig::from_json_str(
        r#"{ "world_width": 80.0, "world_height": 60.0, "walls": false, "rng_seed": 11 }"#,
    )
    .expect("config");
    let mut arena = Arena::new(config).expect("arena");
    let id = arena.add_body(Body::new(BodyState::at(Vector::new(10.0, 10.0), 0.0)));
    assert_eq!(arena.len(), 1);
    assert_eq!(arena.body_ids().collect::<Vec<_>>(), [id]);
    let report = arena.step(0.1).expect("step");
    assert_eq!(report.bodies, 1);
    assert_eq!(report.walls_steps, 0);
}
