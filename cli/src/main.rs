use clap::{App, Arg};
use glam::Vec3;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use sah_bvh::{sah_cost, Aabb, BuildOutcome, BuildSettings, SplitStrategy, TopDownBuilder};
use sah_utils::{NeverCancel, TaskManager};
use std::error::Error;
use std::sync::Arc;
use std::time::Instant;

enum Distribution {
    Uniform,
    Clustered,
    Coincident,
}

fn generate(distribution: &Distribution, count: usize, seed: u64) -> Vec<Aabb> {
    let mut rng = SmallRng::seed_from_u64(seed);
    match distribution {
        Distribution::Uniform => (0..count)
            .map(|_| {
                let p = Vec3::new(rng.gen(), rng.gen(), rng.gen()) * 1000.0;
                let size = Vec3::new(rng.gen(), rng.gen(), rng.gen()) + Vec3::splat(0.01);
                Aabb::from_min_max(p, p + size)
            })
            .collect(),
        Distribution::Clustered => {
            let centres: Vec<Vec3> = (0..32)
                .map(|_| Vec3::new(rng.gen(), rng.gen(), rng.gen()) * 1000.0)
                .collect();
            (0..count)
                .map(|i| {
                    let offset = Vec3::new(rng.gen(), rng.gen(), rng.gen()) * 10.0;
                    let p = centres[i % centres.len()] + offset;
                    Aabb::from_min_max(p, p + Vec3::splat(0.25))
                })
                .collect()
        }
        Distribution::Coincident => {
            vec![Aabb::from_min_max(Vec3::ZERO, Vec3::ONE); count]
        }
    }
}

fn parse<T: std::str::FromStr>(value: Option<&str>, name: &str, default: T) -> Result<T, Box<dyn Error>> {
    match value {
        Some(v) => v
            .parse::<T>()
            .map_err(|_| format!("invalid value '{}' for --{}", v, name).into()),
        None => Ok(default),
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let matches = App::new("sah-bvh")
        .version("0.1.0")
        .author("Mèir Noordermeer <meirnoordermeer@me.com>")
        .about("Builds a SAH BVH over synthetic boxes and reports statistics")
        .arg(Arg::with_name("count")
            .short("n")
            .long("count")
            .takes_value(true)
            .help("number of boxes to generate"))
        .arg(Arg::with_name("threads")
            .short("t")
            .long("threads")
            .takes_value(true)
            .help("worker threads, 0 runs every task inline"))
        .arg(Arg::with_name("strategy")
            .short("s")
            .long("strategy")
            .takes_value(true)
            .possible_values(&["exact", "binning", "auto"])
            .help("split search strategy"))
        .arg(Arg::with_name("distribution")
            .short("d")
            .long("distribution")
            .takes_value(true)
            .possible_values(&["uniform", "clustered", "coincident"])
            .help("box distribution"))
        .arg(Arg::with_name("seed")
            .long("seed")
            .takes_value(true)
            .help("random seed"))
        .arg(Arg::with_name("leaf-threshold")
            .long("leaf-threshold")
            .takes_value(true)
            .help("ranges of at most this many objects become leaves"))
        .arg(Arg::with_name("max-leaf")
            .long("max-leaf")
            .takes_value(true)
            .help("maximum number of objects per leaf"))
        .arg(Arg::with_name("intersection-cost")
            .long("intersection-cost")
            .takes_value(true)
            .help("cost of an object intersection relative to a traversal step"))
        .arg(Arg::with_name("json")
            .long("json")
            .help("print statistics as JSON"))
        .get_matches();

    let defaults = BuildSettings::default();
    let count = parse(matches.value_of("count"), "count", 1_000_000usize)?;
    let threads = parse(matches.value_of("threads"), "threads", num_cpus::get())?;
    let seed = parse(matches.value_of("seed"), "seed", 1u64)?;
    let strategy = parse(matches.value_of("strategy"), "strategy", SplitStrategy::Auto)?;
    let distribution = match matches.value_of("distribution").unwrap_or("uniform") {
        "clustered" => Distribution::Clustered,
        "coincident" => Distribution::Coincident,
        _ => Distribution::Uniform,
    };

    let settings = BuildSettings {
        leaf_object_threshold: parse(
            matches.value_of("leaf-threshold"),
            "leaf-threshold",
            defaults.leaf_object_threshold,
        )?,
        max_objects_per_leaf: parse(
            matches.value_of("max-leaf"),
            "max-leaf",
            defaults.max_objects_per_leaf,
        )?,
        intersection_cost: parse(
            matches.value_of("intersection-cost"),
            "intersection-cost",
            defaults.intersection_cost,
        )?,
        strategy,
        ..defaults
    };

    let instant = Instant::now();
    let aabbs = generate(&distribution, count, seed);
    log::info!("generated {} boxes in {} ms", aabbs.len(), instant.elapsed().as_millis());

    let mut builder = TopDownBuilder::new(settings)?;
    let scheduler = Arc::new(TaskManager::with_name("bvh-worker", threads));

    let instant = Instant::now();
    let result = match builder.build(&aabbs, &scheduler, NeverCancel)? {
        BuildOutcome::Complete(result) => result,
        BuildOutcome::Cancelled => return Err("build was cancelled".into()),
    };
    let elapsed = instant.elapsed();
    let cost = sah_cost(&result.nodes, settings.intersection_cost);

    if matches.is_present("json") {
        let report = serde_json::json!({
            "objects": aabbs.len(),
            "threads": threads,
            "build_ms": elapsed.as_secs_f64() * 1000.0,
            "sah_cost": cost,
            "nodes": result.nodes.len(),
            "settings": settings,
            "statistics": builder.statistics(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("built BVH over {} objects in {} ms", aabbs.len(), elapsed.as_millis());
        println!("nodes:                      {}", result.nodes.len());
        println!("SAH cost:                   {:.3}", cost);
        println!("{}", builder.statistics());
    }

    Ok(())
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
