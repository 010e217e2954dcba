use acadrec::services::features::FeatureVectorBuilder;
use acadrec::services::similarity::{compute_pair, SimilarityEngine};
use acadrec::stores::memory::*;
use acadrec::*;
use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

fn sample_vector(lat: f64, lng: f64) -> ItemFeatureVector {
    let mut subject = HashMap::new();
    subject.insert(AgeGroup::Elementary, 2.0);
    subject.insert(AgeGroup::Middle, 1.0);

    ItemFeatureVector {
        item_id: Uuid::new_v4(),
        subject,
        location: LocationDescriptor {
            province: "Seoul".to_string(),
            district: "Gangnam".to_string(),
            latitude: Some(lat),
            longitude: Some(lng),
            region_cluster: None,
        },
        price: PriceDescriptor {
            has_fee_info: true,
            band: Some(PriceBand::Medium),
            fee_value: 150_000.0,
        },
        facility: FacilityDescriptor {
            has_shuttle: true,
            facility_score: 1.5,
        },
        popularity_score: 2.5,
        rating_score: 3.0,
        engagement_score: 1.0,
        schema_version: VECTOR_SCHEMA_VERSION.to_string(),
        last_updated: Utc::now(),
    }
}

fn benchmark_pair_similarity(c: &mut Criterion) {
    let a = sample_vector(37.50, 127.00);
    let b = sample_vector(37.62, 127.05);
    let users_a: HashSet<Uuid> = (0..50).map(|_| Uuid::new_v4()).collect();
    let mut users_b = users_a.clone();
    users_b.extend((0..50).map(|_| Uuid::new_v4()));

    c.bench_function("pair_similarity", |bench| {
        bench.iter(|| {
            black_box(compute_pair(&a, &b, &users_a, &users_b).unwrap());
        });
    });
}

fn benchmark_similarity_sweep(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("similarity_sweep_100_items", |bench| {
        bench.to_async(&rt).iter(|| async {
            let behavior = Arc::new(MemoryBehaviorStore::new());
            let vectors = Arc::new(MemoryVectorStore::new());
            let similarities = Arc::new(MemorySimilarityStore::new());

            {
                use acadrec::stores::VectorStore;
                for i in 0..100 {
                    let vector = sample_vector(37.4 + (i as f64) * 0.002, 127.0);
                    vectors.upsert(&vector).await.unwrap();
                }
            }

            let engine = SimilarityEngine::new(behavior, vectors, similarities);
            black_box(engine.calculate_all().await.unwrap());
        });
    });
}

fn benchmark_recommendation_serving(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let config = Arc::new(Config::default());
    let behavior = Arc::new(MemoryBehaviorStore::new());
    let catalog = Arc::new(MemoryCatalog::new());
    let vectors = Arc::new(MemoryVectorStore::new());

    let mut item_ids = Vec::new();
    rt.block_on(async {
        for i in 0..500 {
            let item = ItemAttributes::new(Uuid::new_v4(), format!("academy-{i}"))
                .with_subject(AgeGroup::Elementary, "math, english")
                .with_region("Seoul", "Gangnam-gu")
                .with_coordinates(37.5 + (i as f64) * 0.0005, 127.0)
                .with_tuition("150,000 per month");
            item_ids.push(item.id);
            catalog.insert(item.clone());
            behavior.push(BehaviorEvent::new(
                Some(Uuid::new_v4()),
                Some(item.id),
                ActionType::View,
            ));
        }
        let builder = FeatureVectorBuilder::new(
            catalog.clone(),
            behavior.clone(),
            vectors.clone(),
            config.clone(),
        );
        builder.build_all().await.unwrap();
    });

    let state = AppState::with_stores(
        config,
        behavior.clone(),
        catalog,
        Arc::new(MemoryProfileStore::new()),
        vectors,
        Arc::new(MemorySimilarityStore::new()),
        Arc::new(MemoryRecommendationStore::new()),
        Arc::new(MemoryCache::new()),
    );

    let user_id = Uuid::new_v4();
    for item_id in item_ids.iter().take(10) {
        behavior.push(BehaviorEvent::new(
            Some(user_id),
            Some(*item_id),
            ActionType::Contact,
        ));
    }

    c.bench_function("serve_recommendations_500_items", |bench| {
        bench.to_async(&rt).iter(|| async {
            // Bypass the response cache so each iteration ranks from scratch.
            state
                .recommendation_engine
                .clear_recommendation_cache()
                .await
                .unwrap();
            black_box(
                state
                    .recommendation_engine
                    .get_recommendations(user_id, 20, &RecommendationContext::default())
                    .await
                    .unwrap(),
            );
        });
    });
}

criterion_group!(
    benches,
    benchmark_pair_similarity,
    benchmark_similarity_sweep,
    benchmark_recommendation_serving
);
criterion_main!(benches);
