use std::time::Duration;

use criterion::measurement::WallTime;
use criterion::{
    black_box, criterion_group, criterion_main, BenchmarkGroup, BenchmarkId, Criterion,
};
use serde::{Deserialize, Serialize};

use rowjson::{Contract, Document, NodeTree, Shaped};

#[derive(Clone, PartialEq, Serialize, Deserialize)]
struct Owner {
    id: u64,
    login: String,
    site_admin: bool,
}

impl Shaped for Owner {
    fn contract() -> Contract {
        Contract::object::<Owner>("owner")
            .member("id", |o: &Owner| &o.id)
            .member("login", |o: &Owner| &o.login)
            .member("site_admin", |o: &Owner| &o.site_admin)
            .build(|slots| {
                Ok(Owner {
                    id: slots.take("id")?,
                    login: slots.take("login")?,
                    site_admin: slots.take("site_admin")?,
                })
            })
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
struct Repo {
    id: u64,
    name: String,
    full_name: String,
    description: Option<String>,
    private: bool,
    fork: bool,
    language: Option<String>,
    stargazers_count: u32,
    forks_count: u32,
    topics: Vec<String>,
    owner: Owner,
}

impl Shaped for Repo {
    fn contract() -> Contract {
        Contract::object::<Repo>("repo")
            .member("id", |r: &Repo| &r.id)
            .member("name", |r: &Repo| &r.name)
            .member("full_name", |r: &Repo| &r.full_name)
            .member("description", |r: &Repo| &r.description)
            .member("private", |r: &Repo| &r.private)
            .member("fork", |r: &Repo| &r.fork)
            .member("language", |r: &Repo| &r.language)
            .member("stargazers_count", |r: &Repo| &r.stargazers_count)
            .member("forks_count", |r: &Repo| &r.forks_count)
            .member("topics", |r: &Repo| &r.topics)
            .member("owner", |r: &Repo| &r.owner)
            .build(|slots| {
                Ok(Repo {
                    id: slots.take("id")?,
                    name: slots.take("name")?,
                    full_name: slots.take("full_name")?,
                    description: slots.take("description")?,
                    private: slots.take("private")?,
                    fork: slots.take("fork")?,
                    language: slots.take("language")?,
                    stargazers_count: slots.take("stargazers_count")?,
                    forks_count: slots.take("forks_count")?,
                    topics: slots.take("topics")?,
                    owner: slots.take("owner")?,
                })
            })
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
struct TreeNode {
    name: String,
    value: i64,
    flags: Vec<String>,
    children: Vec<TreeNode>,
}

impl Shaped for TreeNode {
    fn contract() -> Contract {
        Contract::object::<TreeNode>("tree node")
            .member("name", |n: &TreeNode| &n.name)
            .member("value", |n: &TreeNode| &n.value)
            .member("flags", |n: &TreeNode| &n.flags)
            .member("children", |n: &TreeNode| &n.children)
            .build(|slots| {
                Ok(TreeNode {
                    name: slots.take("name")?,
                    value: slots.take("value")?,
                    flags: slots.take("flags")?,
                    children: slots.take("children")?,
                })
            })
    }
}

fn make_repos(count: usize) -> Vec<Repo> {
    let mut repos = Vec::with_capacity(count);
    for i in 0..count {
        repos.push(Repo {
            id: i as u64,
            name: format!("repo-{}", i),
            full_name: format!("org/repo-{}", i),
            description: if i % 3 == 0 {
                None
            } else {
                Some(format!("Repository {}", i))
            },
            private: i % 10 == 0,
            fork: i % 7 == 0,
            language: match i % 5 {
                0 => Some("Rust".to_string()),
                1 => Some("Go".to_string()),
                2 => Some("TypeScript".to_string()),
                _ => None,
            },
            stargazers_count: (i * 13) as u32,
            forks_count: (i * 3) as u32,
            topics: vec![
                format!("topic-{}", i % 10),
                format!("topic-{}", (i + 3) % 10),
            ],
            owner: Owner {
                id: (i % 100) as u64,
                login: format!("user-{}", i % 100),
                site_admin: i % 97 == 0,
            },
        });
    }
    repos
}

fn make_tree(depth: usize, width: usize, seed: u64) -> TreeNode {
    let mut children = Vec::new();
    if depth > 0 {
        for i in 0..width {
            children.push(make_tree(depth - 1, width, seed * 31 + i as u64));
        }
    }
    TreeNode {
        name: format!("node-{}", seed),
        value: seed as i64 - 500,
        flags: vec![format!("f{}", seed % 5), format!("f{}", (seed + 2) % 5)],
        children,
    }
}

fn bench_scan(group: &mut BenchmarkGroup<'_, WallTime>, name: &str, text: &str) {
    group.throughput(criterion::Throughput::Bytes(text.len() as u64));
    group.bench_function(BenchmarkId::new("rowjson_document", name), |b| {
        b.iter(|| {
            let doc = Document::parse(black_box(text)).unwrap();
            black_box(doc);
        });
    });

    group.bench_function(BenchmarkId::new("rowjson_tree", name), |b| {
        b.iter(|| {
            let tree = NodeTree::parse(black_box(text)).unwrap();
            black_box(tree);
        });
    });

    group.bench_function(BenchmarkId::new("serde_json_value", name), |b| {
        b.iter(|| {
            let value: serde_json::Value = serde_json::from_str(black_box(text)).unwrap();
            black_box(value);
        });
    });
}

fn bench_decode<T: Shaped + for<'de> Deserialize<'de>>(
    group: &mut BenchmarkGroup<'_, WallTime>,
    name: &str,
    text: &str,
) {
    group.throughput(criterion::Throughput::Bytes(text.len() as u64));
    group.bench_function(BenchmarkId::new("rowjson", name), |b| {
        b.iter(|| {
            let value: T = rowjson::from_str(black_box(text)).unwrap();
            black_box(value);
        });
    });

    group.bench_function(BenchmarkId::new("serde_json", name), |b| {
        b.iter(|| {
            let value: T = serde_json::from_str(black_box(text)).unwrap();
            black_box(value);
        });
    });
}

fn bench_encode<T: Shaped + Serialize>(
    group: &mut BenchmarkGroup<'_, WallTime>,
    name: &str,
    value: &T,
    len: usize,
) {
    group.throughput(criterion::Throughput::Bytes(len as u64));
    group.bench_function(BenchmarkId::new("rowjson", name), |b| {
        b.iter(|| {
            let text = rowjson::to_string(black_box(value)).unwrap();
            black_box(text);
        });
    });

    group.bench_function(BenchmarkId::new("serde_json", name), |b| {
        b.iter(|| {
            let text = serde_json::to_string(black_box(value)).unwrap();
            black_box(text);
        });
    });
}

fn criterion_config() -> Criterion {
    if std::env::var("ROWJSON_BENCH_MINIMAL").is_ok() {
        Criterion::default()
            .warm_up_time(Duration::from_secs(0))
            .measurement_time(Duration::from_millis(10))
            .sample_size(10)
            .nresamples(1)
    } else {
        Criterion::default()
    }
}

fn criterion_benchmark(c: &mut Criterion) {
    let repos = make_repos(2000);
    let repos_text = rowjson::to_string(&repos).unwrap();

    let tree = make_tree(5, 3, 1);
    let tree_text = rowjson::to_string(&tree).unwrap();

    let mut scan = c.benchmark_group("scan");
    bench_scan(&mut scan, "uniform_repos", &repos_text);
    bench_scan(&mut scan, "deep_tree", &tree_text);
    scan.finish();

    let mut decode = c.benchmark_group("decode");
    bench_decode::<Vec<Repo>>(&mut decode, "uniform_repos", &repos_text);
    bench_decode::<TreeNode>(&mut decode, "deep_tree", &tree_text);
    decode.finish();

    let mut encode = c.benchmark_group("encode");
    bench_encode(&mut encode, "uniform_repos", &repos, repos_text.len());
    bench_encode(&mut encode, "deep_tree", &tree, tree_text.len());
    encode.finish();
}

criterion_group! {
    name = benches;
    config = criterion_config();
    targets = criterion_benchmark
}
criterion_main!(benches);
