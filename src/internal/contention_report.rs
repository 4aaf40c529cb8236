#![allow(clippy::missing_docs_in_private_items)]
#![allow(clippy::arithmetic_side_effects)]
#![allow(clippy::indexing_slicing)]
#![allow(clippy::pedantic)]
#![allow(clippy::unwrap_used)]

use plotters::prelude::*;
use probemap::IntIntMap;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

// Workload shape
const THREAD_COUNTS: [usize; 5] = [1, 2, 4, 8, 16];
const OPS_PER_THREAD: usize = 200_000;
const KEY_SPACE: i32 = 50_000;
// Percentage of operations that write
const WRITE_PERCENT: u32 = 20;
const GROWTH_KEYS: i32 = 100_000;

/// One pre-generated operation
#[derive(Clone, Copy)]
enum Op {
    Get(i32),
    Put(i32, i32),
}

// Random mixed workload, generated up front so the timed loop only touches the map
fn workload(len: usize) -> Vec<Op> {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| {
            let key = rng.random_range(1..=KEY_SPACE);
            if rng.random_range(0..100) < WRITE_PERCENT {
                Op::Put(key, rng.random_range(1..1_000_000))
            } else {
                Op::Get(key)
            }
        })
        .collect()
}

// Runs every thread's workload against `apply` and returns operations per second
fn run<M, F>(map: Arc<M>, workloads: &[Vec<Op>], apply: F) -> f64
where
    M: Send + Sync + 'static,
    F: Fn(&M, Op) + Copy + Send + 'static,
{
    let start = Instant::now();
    let handles: Vec<_> = workloads
        .iter()
        .cloned()
        .map(|ops| {
            let map = Arc::clone(&map);
            thread::spawn(move || {
                for op in ops {
                    apply(&map, op);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    let total = workloads.iter().map(Vec::len).sum::<usize>() as f64;
    total / start.elapsed().as_secs_f64()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut lock_free: Vec<f64> = Vec::new();
    let mut locked: Vec<f64> = Vec::new();

    for &threads in &THREAD_COUNTS {
        let workloads: Vec<Vec<Op>> = (0..threads).map(|_| workload(OPS_PER_THREAD)).collect();

        let map = Arc::new(IntIntMap::new());
        let map_ops = run(map, &workloads, |map: &IntIntMap, op| match op {
            Op::Get(key) => {
                map.get(key).unwrap();
            }
            Op::Put(key, value) => {
                map.put(key, value).unwrap();
            }
        });

        let mutex = Arc::new(Mutex::new(HashMap::new()));
        let mutex_ops = run(mutex, &workloads, |map: &Mutex<HashMap<i32, i32>>, op| match op {
            Op::Get(key) => {
                let _value = map.lock().unwrap().get(&key).copied();
            }
            Op::Put(key, value) => {
                map.lock().unwrap().insert(key, value);
            }
        });

        println!(
            "{} threads: IntIntMap = {:.0} ops/s, Mutex<HashMap> = {:.0} ops/s",
            threads, map_ops, mutex_ops
        );
        lock_free.push(map_ops);
        locked.push(mutex_ops);
    }

    // Capacity after every insert, sampled at each change
    let map = IntIntMap::new();
    let mut growth: Vec<(i32, usize)> = vec![(0, map.capacity())];
    let mut rng = rand::rng();
    for inserted in 1..=GROWTH_KEYS {
        map.put(rng.random_range(1..i32::MAX), inserted)?;
        let capacity = map.capacity();
        if capacity != growth.last().unwrap().1 {
            growth.push((inserted, capacity));
        }
    }
    growth.push((GROWTH_KEYS, map.capacity()));
    println!("Capacity steps: {:?}", growth);

    // Plot configuration
    let font_family = "sans-serif";
    let colors = [
        RGBColor(220, 50, 50), // Bright red
        RGBColor(50, 90, 220), // Bright blue
    ];
    let line_width = 2;
    let marker_size = 4;
    let text_size = 16;
    let title_size = 35;

    // Plot 1: throughput by thread count
    let root = BitMapBackend::new("contention_throughput.png", (1200, 800)).into_drawing_area();
    root.fill(&WHITE)?;

    let max_ops = lock_free.iter().chain(&locked).fold(0.0, |max: f64, &x| max.max(x)) * 1.1;

    let mut chart = ChartBuilder::on(&root)
        .caption("Throughput Under Contention", (font_family, title_size))
        .margin(15)
        .x_label_area_size(60)
        .y_label_area_size(90)
        .build_cartesian_2d(0..(THREAD_COUNTS.len() - 1), 0.0..max_ops)?;

    chart
        .configure_mesh()
        .x_labels(THREAD_COUNTS.len())
        .x_label_formatter(&|x| THREAD_COUNTS.get(*x).map_or_else(String::new, |n| n.to_string()))
        .x_desc("Threads")
        .y_desc("Operations per second")
        .axis_desc_style((font_family, text_size))
        .draw()?;

    for (series, (name, color)) in
        [&lock_free, &locked].into_iter().zip([("IntIntMap", colors[0]), ("Mutex<HashMap>", colors[1])])
    {
        let line_style = ShapeStyle::from(&color).stroke_width(line_width);
        chart
            .draw_series(LineSeries::new(series.iter().copied().enumerate(), line_style))?
            .label(name)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], line_style));
        chart.draw_series(
            series.iter().enumerate().map(|(x, &y)| Circle::new((x, y), marker_size, color.filled())),
        )?;
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .label_font((font_family, text_size))
        .draw()?;
    root.present()?;

    // Plot 2: capacity against inserted keys
    let root = BitMapBackend::new("capacity_growth.png", (1200, 800)).into_drawing_area();
    root.fill(&WHITE)?;

    let max_capacity = growth.iter().map(|&(_, capacity)| capacity).max().unwrap_or(2) as f64;

    let mut chart = ChartBuilder::on(&root)
        .caption("Capacity Growth", (font_family, title_size))
        .margin(15)
        .x_label_area_size(60)
        .y_label_area_size(90)
        .build_cartesian_2d(0..GROWTH_KEYS, 0.0..max_capacity * 1.1)?;

    chart
        .configure_mesh()
        .x_desc("Keys Inserted")
        .y_desc("Root Capacity (slots)")
        .axis_desc_style((font_family, text_size))
        .draw()?;

    let line_style = ShapeStyle::from(&colors[1]).stroke_width(line_width);
    // Capacity only changes at migrations, so draw it as a step function
    let steps: Vec<(i32, f64)> = growth
        .windows(2)
        .flat_map(|pair| {
            let ((from, capacity), (to, _)) = (pair[0], pair[1]);
            [(from, capacity as f64), (to, capacity as f64)]
        })
        .collect();
    chart
        .draw_series(LineSeries::new(steps, line_style))?
        .label("IntIntMap root capacity")
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], line_style));
    chart.draw_series(
        growth
            .iter()
            .map(|&(x, capacity)| Circle::new((x, capacity as f64), marker_size, colors[0].filled())),
    )?;

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .label_font((font_family, text_size))
        .draw()?;
    root.present()?;

    println!("Wrote contention_throughput.png and capacity_growth.png");
    Ok(())
}
