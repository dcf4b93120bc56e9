use super::*;
use crate::model::bend::{Bend, LayerTransform};
use crate::model::fake::{InPlaceGenerator, RecordingGenerator};
use crate::model::rewrite::Rewrite;
use std::sync::{Arc, Mutex};

fn indexed_latents(n: usize) -> Tensor {
    let values: Vec<f32> = (0..n).flat_map(|i| [i as f32, 0.0]).collect();
    Tensor::from_vec(values, (n, 2), &Device::Cpu).unwrap()
}

fn sequence(n: usize) -> SampleSequence {
    SampleSequence::new(indexed_latents(n), 0.0, 1.0).unwrap()
}

fn run_all(scheduler: &mut BatchScheduler<'_>) -> RenderResult<Vec<(BatchRange, Vec<usize>)>> {
    let mut published = Vec::new();
    scheduler.run(|range, images| {
        published.push((range, images.dims().to_vec()));
        Ok(())
    })?;
    Ok(published)
}

#[test]
fn batches_are_published_in_order_with_short_tail() {
    let mut generator = RecordingGenerator::new(2);
    let edits = ModelEdits::none();
    let samples = sequence(10);
    let mut scheduler = BatchScheduler::new(&mut generator, &samples, &edits, 4, false).unwrap();
    assert_eq!(scheduler.batches().len(), 3);

    let published = run_all(&mut scheduler).unwrap();
    let lens: Vec<usize> = published.iter().map(|(r, _)| r.len()).collect();
    assert_eq!(lens, vec![4, 4, 2]);
    assert_eq!(published[2].1, vec![2, 3, 2, 2]);
    drop(scheduler);

    let seen: Vec<f32> = generator
        .calls
        .iter()
        .flat_map(|c| c.latents.clone())
        .collect();
    assert_eq!(seen, (0..10).map(|i| i as f32).collect::<Vec<_>>());
    assert!(
        generator
            .calls
            .iter()
            .all(|c| c.input_is_latent && !c.randomize_noise)
    );
}

#[test]
fn randomize_noise_is_forwarded() {
    let mut generator = RecordingGenerator::new(1);
    let edits = ModelEdits::none();
    let samples = sequence(2);
    let mut scheduler = BatchScheduler::new(&mut generator, &samples, &edits, 2, true).unwrap();
    run_all(&mut scheduler).unwrap();
    drop(scheduler);
    assert!(generator.calls[0].randomize_noise);
}

#[test]
fn absent_noise_stays_absent_and_shared_noise_is_never_sliced() {
    let per_frame = Tensor::zeros((5, 1, 2, 2), DType::F32, &Device::Cpu).unwrap();
    let shared = Tensor::zeros((1, 1, 4, 4), DType::F32, &Device::Cpu).unwrap();
    let samples = sequence(5)
        .with_noise(vec![
            NoiseScale::Absent,
            NoiseScale::PerFrame(per_frame),
            NoiseScale::Shared(shared),
        ])
        .unwrap();

    let mut generator = RecordingGenerator::new(1);
    let edits = ModelEdits::none();
    let mut scheduler = BatchScheduler::new(&mut generator, &samples, &edits, 2, false).unwrap();
    run_all(&mut scheduler).unwrap();
    drop(scheduler);

    let expected_lens = [2, 2, 1];
    for (call, len) in generator.calls.iter().zip(expected_lens) {
        assert_eq!(call.noise[0], None);
        assert_eq!(call.noise[1], Some(vec![len, 1, 2, 2]));
        assert_eq!(call.noise[2], Some(vec![1, 1, 4, 4]));
    }
}

#[test]
fn scalar_truncation_is_passed_whole_and_sequences_are_sliced() {
    let mut generator = RecordingGenerator::new(1);
    let edits = ModelEdits::none();
    let samples = sequence(3).with_truncation(Truncation::Scalar(0.7)).unwrap();
    let mut scheduler = BatchScheduler::new(&mut generator, &samples, &edits, 2, false).unwrap();
    run_all(&mut scheduler).unwrap();
    drop(scheduler);
    assert!(generator.calls.iter().all(|c| c.truncation == Ok(0.7)));

    let psi = Tensor::new(&[0.1f32, 0.2, 0.3], &Device::Cpu).unwrap();
    let samples = sequence(3).with_truncation(Truncation::PerFrame(psi)).unwrap();
    let mut generator = RecordingGenerator::new(1);
    let mut scheduler = BatchScheduler::new(&mut generator, &samples, &edits, 2, false).unwrap();
    run_all(&mut scheduler).unwrap();
    drop(scheduler);
    assert_eq!(generator.calls[0].truncation, Err(vec![0.1, 0.2]));
    assert_eq!(generator.calls[1].truncation, Err(vec![0.3]));
}

#[test]
fn rewrites_derive_from_the_snapshot_every_batch_and_are_restored() {
    let mut generator = RecordingGenerator::new(1).with_param("w", &[1.0, 2.0]);
    let modulation = Tensor::new(&[10f32, 20.0, 30.0, 40.0, 50.0], &Device::Cpu).unwrap();
    let mut edits = ModelEdits::none();
    edits.rewrites.insert(
        "w".to_string(),
        Rewrite::new(modulation, |snapshot, step| {
            // First modulation value of the batch, added to the original weight.
            let m = step.modulation.get(0)?.to_scalar::<f32>()? as f64;
            Ok(snapshot.affine(1.0, m)?)
        }),
    );

    let samples = sequence(5);
    let mut scheduler = BatchScheduler::new(&mut generator, &samples, &edits, 2, false).unwrap();
    run_all(&mut scheduler).unwrap();
    drop(scheduler);

    let seen: Vec<Vec<f32>> = generator
        .calls
        .iter()
        .map(|c| c.params["w"].clone())
        .collect();
    assert_eq!(
        seen,
        vec![vec![11.0, 12.0], vec![31.0, 32.0], vec![51.0, 52.0]]
    );
    assert_eq!(generator.param_values("w"), vec![1.0, 2.0]);
}

#[test]
fn in_place_generator_rewrites_always_see_the_original_weight() {
    let mut generator = InPlaceGenerator::new().with_param("w", &[1.0, 2.0]);
    let inputs = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&inputs);
    let mut edits = ModelEdits::none();
    edits.rewrites.insert(
        "w".to_string(),
        Rewrite::new(Tensor::zeros(6, DType::F32, &Device::Cpu).unwrap(), move |s, _| {
            recorded.lock().unwrap().push(s.to_vec1::<f32>()?);
            Ok(s.affine(1.0, 10.0)?)
        }),
    );

    let samples = sequence(6);
    let mut scheduler = BatchScheduler::new(&mut generator, &samples, &edits, 2, false).unwrap();
    run_all(&mut scheduler).unwrap();
    drop(scheduler);

    assert_eq!(*inputs.lock().unwrap(), vec![vec![1.0, 2.0]; 3]);
    let installed: Vec<Vec<f32>> = generator.seen.iter().map(|p| p["w"].clone()).collect();
    assert_eq!(installed, vec![vec![11.0, 12.0]; 3]);
    assert_eq!(generator.param_values("w"), vec![1.0, 2.0]);
}

#[test]
fn bends_are_prepared_in_list_order_each_batch() {
    let modulation = Tensor::new(&[1f32, 2.0, 3.0], &Device::Cpu).unwrap();
    let mut edits = ModelEdits::none();
    edits.bends = vec![
        Bend::fixed("a", |x| Ok(x.clone())),
        Bend::modulated("b", modulation, |m| {
            assert!(m.dims()[0] <= 2);
            let t: LayerTransform = Arc::new(|x: &Tensor| Ok(x.clone()));
            Ok(t)
        }),
    ];

    let mut generator = RecordingGenerator::new(1);
    let samples = sequence(3);
    let mut scheduler = BatchScheduler::new(&mut generator, &samples, &edits, 2, false).unwrap();
    run_all(&mut scheduler).unwrap();
    drop(scheduler);
    assert!(generator.calls.iter().all(|c| c.bend_layers == ["a", "b"]));
}

#[test]
fn generator_failure_aborts_and_still_restores_parameters() {
    let mut generator = RecordingGenerator::new(1).with_param("w", &[5.0]);
    generator.fail_on_call = Some(1);
    let mut edits = ModelEdits::none();
    edits.rewrites.insert(
        "w".to_string(),
        Rewrite::new(Tensor::zeros(4, DType::F32, &Device::Cpu).unwrap(), |s, _| {
            Ok(s.affine(0.0, -1.0)?)
        }),
    );

    let samples = sequence(4);
    let mut scheduler = BatchScheduler::new(&mut generator, &samples, &edits, 2, false).unwrap();
    let mut published = 0;
    let err = scheduler
        .run(|_, _| {
            published += 1;
            Ok(())
        })
        .unwrap_err();
    drop(scheduler);

    assert!(matches!(err, RenderError::Accelerator(_)));
    assert_eq!(published, 1);
    assert_eq!(generator.param_values("w"), vec![5.0]);
}

#[test]
fn modulation_length_must_match_frame_count() {
    let mut edits = ModelEdits::none();
    edits.bends = vec![Bend::modulated(
        "b",
        Tensor::zeros(2, DType::F32, &Device::Cpu).unwrap(),
        |_| {
            let t: LayerTransform = Arc::new(|x: &Tensor| Ok(x.clone()));
            Ok(t)
        },
    )];
    let mut generator = RecordingGenerator::new(1);
    let samples = sequence(3);
    assert!(BatchScheduler::new(&mut generator, &samples, &edits, 2, false).is_err());
}
