use casecorr::{
    AttributeType, CaseHandle, CentralRepository, CommonAttributeSearcher, CorrelationCase,
    CorrelationQueryEngine, FileRef, FrequencyThreshold, InstanceRecord, MimeFilter, SearchFilters,
    SearchScope, StaticCaseContext,
};
use tempfile::tempdir;

const H1: &str = "a87ff679a2f3e71d9181a67b7542122c";
const H2: &str = "e4da3b7fbbce2345d7772b0674a318d5";
const H3: &str = "1679091c5a880faf6fb5e6087eb1b2dc";

fn record(repo: &CentralRepository, case: &CorrelationCase, path: &str, mime: &str, value: &str) {
    let ds = repo.add_data_source(case.id, "evidence.e01", "").expect("data source");
    repo.record_instance(InstanceRecord {
        case_id: case.id,
        data_source_id: ds.id,
        attribute_type: AttributeType::Files,
        value: value.to_string(),
        file: FileRef {
            object_id: None,
            path: path.to_string(),
            mime_types: vec![mime.to_string()],
        },
        comment: None,
        known_status: None,
    })
    .expect("record instance");
}

fn media_only(threshold: FrequencyThreshold) -> SearchFilters {
    SearchFilters {
        attribute_type: AttributeType::Files,
        mime: MimeFilter::media_only(),
        threshold,
    }
}

#[test]
fn specific_case_match_groups_both_instances() {
    let repo = CentralRepository::new();
    let current = repo.add_case("Current");
    let case_x = repo.add_case("CaseX");
    record(&repo, &current, "/A.jpg", "image/jpeg", H1);
    record(&repo, &case_x, "/B.jpg", "image/jpeg", H1);

    let engine = CorrelationQueryEngine::new(&repo);
    let results = engine
        .find_in_specific_other_case(
            &CaseHandle::new(current.clone()),
            case_x.id,
            &media_only(FrequencyThreshold::explicit(100)),
        )
        .expect("search");

    assert_eq!(results.lists().len(), 1);
    let list = &results.lists()[0];
    assert_eq!(list.case_id(), case_x.id);
    assert_eq!(list.values().len(), 1);

    let value = &list.values()[0];
    assert_eq!(value.value(), H1);
    let paths: Vec<&str> = value.instances().iter().map(|i| i.file.path.as_str()).collect();
    assert_eq!(paths, vec!["/B.jpg", "/A.jpg"]);
}

#[test]
fn excluded_mime_type_cannot_anchor_a_match() {
    let repo = CentralRepository::new();
    let current = repo.add_case("Current");
    let case_x = repo.add_case("CaseX");
    record(&repo, &current, "/A.docx", "application/msword", H1);
    record(&repo, &case_x, "/B.jpg", "image/jpeg", H1);

    let engine = CorrelationQueryEngine::new(&repo);
    let results = engine
        .find_in_specific_other_case(
            &CaseHandle::new(current),
            case_x.id,
            &media_only(FrequencyThreshold::explicit(100)),
        )
        .expect("search");

    assert!(results.is_empty());
}

#[test]
fn frequent_values_are_dropped_above_threshold() {
    let repo = CentralRepository::new();
    let cases: Vec<CorrelationCase> = (0..10).map(|n| repo.add_case(&format!("Case {:02}", n))).collect();
    for case in &cases {
        // Every case gets a data source even when it holds no value
        repo.add_data_source(case.id, "evidence.e01", "").expect("data source");
    }
    for case in &cases[..3] {
        record(&repo, case, "/common.jpg", "image/jpeg", H2);
    }
    record(&repo, &cases[0], "/rare.jpg", "image/jpeg", H3);
    record(&repo, &cases[7], "/rare-copy.jpg", "image/jpeg", H3);

    let current = CaseHandle::new(cases[0].clone());
    let engine = CorrelationQueryEngine::new(&repo);

    let filtered = engine
        .find_in_all_other_cases(&current, &media_only(FrequencyThreshold::explicit(20)))
        .expect("search");
    let values: Vec<&str> = filtered.lists().iter()
        .flat_map(|l| l.values())
        .map(|v| v.value())
        .collect();
    assert_eq!(values, vec![H3]);
    assert!(filtered.title().ends_with("≤20% frequency)"));

    // Without a threshold the 30% value comes back
    let unfiltered = engine
        .find_in_all_other_cases(&current, &media_only(FrequencyThreshold::Disabled))
        .expect("search");
    assert_eq!(unfiltered.value_count(), 2);
}

#[test]
fn zero_matches_yield_empty_results_with_title() {
    let repo = CentralRepository::new();
    let current = repo.add_case("Current");
    repo.add_case("Other");
    record(&repo, &current, "/lonely.jpg", "image/jpeg", H1);

    let cases = StaticCaseContext::open(current);
    let searcher = CommonAttributeSearcher::new(&repo, &cases, media_only(FrequencyThreshold::explicit(5)));
    let results = searcher.find_matches(SearchScope::AllOtherCases).expect("search");

    assert!(results.is_empty());
    assert_eq!(results.lists().len(), 0);
    assert_eq!(
        results.title(),
        "Common Properties (All Central Repository Cases, Files, ≤5% frequency)"
    );
}

#[test]
fn every_value_groups_a_single_value_and_type() {
    let repo = CentralRepository::new();
    let current = repo.add_case("Current");
    let other = repo.add_case("Other");
    for (i, value) in [H1, H2, H3].iter().enumerate() {
        record(&repo, &current, &format!("/c{}.jpg", i), "image/png", value);
        record(&repo, &other, &format!("/o{}.jpg", i), "image/png", value);
    }

    let results = CorrelationQueryEngine::new(&repo)
        .find_in_all_other_cases(&CaseHandle::new(current), &SearchFilters::default())
        .expect("search");

    assert_eq!(results.value_count(), 3);
    for list in results.lists() {
        for value in list.values() {
            assert!(value.instances().iter().all(|i| i.value == value.value()));
            assert!(value.instances().iter().all(|i| i.attribute_type == value.attribute_type()));
        }
    }
}

#[test]
fn persisted_repository_gives_identical_results() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("repository.json");

    let repo = CentralRepository::new();
    let current = repo.add_case("Current");
    let a = repo.add_case("A");
    let b = repo.add_case("B");
    record(&repo, &current, "/x.jpg", "image/jpeg", H1);
    record(&repo, &current, "/y.jpg", "image/jpeg", H2);
    record(&repo, &a, "/x.jpg", "image/jpeg", H1);
    record(&repo, &b, "/x.jpg", "image/jpeg", H1);
    record(&repo, &b, "/y.jpg", "image/jpeg", H2);
    repo.save(&path).expect("save");

    let handle = CaseHandle::new(current);
    let before = CorrelationQueryEngine::new(&repo)
        .find_in_all_other_cases(&handle, &SearchFilters::default())
        .expect("search");

    let reloaded = CentralRepository::load(&path).expect("load");
    let after = CorrelationQueryEngine::new(&reloaded)
        .find_in_all_other_cases(&handle, &SearchFilters::default())
        .expect("search");

    assert_eq!(before, after);
    let values: Vec<&str> = after.lists()[0].values().iter().map(|v| v.value()).collect();
    assert_eq!(values, vec![H1, H2]);
}
