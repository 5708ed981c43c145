use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use form_organizer::{
    FieldLocationIndex, FieldSets, FlatMap, IndexCache, Organizer,
    template::{Field, Section, Tab, TemplateSchema},
};
use serde_json::{Value, json};

fn generate_template(tabs: usize, sections: usize, fields: usize) -> TemplateSchema {
    let tabs = (0..tabs)
        .map(|t| Tab {
            id: format!("Tab{t}"),
            label: None,
            sections: (0..sections)
                .map(|s| Section {
                    id: format!("Tab{t}Section{s}"),
                    label: None,
                    fields: (0..fields)
                        .map(|f| match f % 10 {
                            0 => {
                                let member_a = format!("member_a_{t}_{s}_{f}");
                                let member_b = format!("member_b_{t}_{s}_{f}");
                                Field::group(
                                    &format!("group_{t}_{s}_{f}"),
                                    &[member_a.as_str(), member_b.as_str()],
                                )
                            }
                            9 => Field::table_hint(&format!("specs_{t}_{s}_{f}")),
                            _ => Field::scalar(&format!("field_{t}_{s}_{f}")),
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect();
    TemplateSchema {
        bank_code: "BENCH".to_string(),
        template_id: "generated".to_string(),
        version: "1".to_string(),
        tabs,
    }
}

fn generate_submission(index: &FieldLocationIndex) -> FlatMap {
    let mut flat = FlatMap::new();
    for (field_id, field) in index.iter() {
        if index.is_group(field_id) {
            continue;
        }
        let value = if field_id.starts_with("specs_") {
            json!([
                {"item": "Foundation", "rate": 500},
                {"item": "Walls", "rate": 300},
                {"item": "Roof", "rate": 250}
            ])
        } else {
            Value::from(format!("{}:{}", field.location, field_id))
        };
        flat.insert(field_id.to_string(), value);
    }
    flat.insert("status".to_string(), json!("draft"));
    flat.insert("applicant_name".to_string(), json!("R. Iyer"));
    flat.insert("random_note".to_string(), json!("hello"));
    flat
}

fn bench_organize(c: &mut Criterion) {
    let schema = generate_template(6, 8, 30);
    let cache = IndexCache::new();
    let index = cache.get_or_build(&schema).expect("build index");
    let submission = generate_submission(&index);
    let organizer = Organizer::new(FieldSets::builtin());

    let mut group = c.benchmark_group("organize");

    group.bench_function("build_index", |b| {
        b.iter(|| FieldLocationIndex::build(&schema).expect("build"));
    });

    group.bench_function("organize_cached_index", |b| {
        b.iter(|| {
            organizer
                .organize_indexed(&submission, &index)
                .expect("organize")
        });
    });

    group.bench_function("organize_then_flatten", |b| {
        b.iter_batched(
            || submission.clone(),
            |flat| {
                let doc = organizer.organize_indexed(&flat, &index).expect("organize");
                form_organizer::flatten::flatten(&doc, &index).expect("flatten")
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_organize);
criterion_main!(benches);
