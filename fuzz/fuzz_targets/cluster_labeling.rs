#![no_main]

use barajar::{AdjacencyGraph, Clusterer, MassAggregation, Tail, TfceParams, TimeChannelMap};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // First two bytes pick the shape, the rest become statistic values.
    if data.len() < 3 {
        return;
    }
    let n_times = (data[0] % 8) as usize + 1;
    let n_channels = (data[1] % 6) as usize + 1;
    let values: Vec<f32> = data[2..]
        .iter()
        .cycle()
        .take(n_times * n_channels)
        .map(|&b| (b as f32 - 128.0) / 16.0)
        .collect();

    let stats = match TimeChannelMap::from_vec(n_times, n_channels, values) {
        Ok(map) => map,
        Err(_) => return,
    };
    let graph = AdjacencyGraph::ring(n_channels);
    let clusterer = Clusterer::new(&graph);

    // Neither mode should panic regardless of input.
    let _ = clusterer.label_clusters(&stats, 1.0, Tail::TwoSided, MassAggregation::SumStat);
    let _ = clusterer.enhance(&stats, &TfceParams::new(0.2, 0.5), Tail::TwoSided);
});
