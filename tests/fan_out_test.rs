use std::sync::{Arc, Mutex};

use pardaaf_core::services::jobs::fan_out_tenants;
use pardaaf_core::tenant;

#[tokio::test]
async fn every_tenant_runs_under_its_own_binding() {
    let seen = Arc::new(Mutex::new(Vec::new()));

    let databases = vec![
        "gallery_t1".to_string(),
        "gallery_t2".to_string(),
        "gallery_t3".to_string(),
    ];

    let report = tenant::with_tenant("pardaaf_main".to_string(), {
        let seen = seen.clone();
        async move {
            fan_out_tenants(databases, "test-job", move |_db| {
                let seen = seen.clone();
                async move {
                    // The binding inside the body is the tenant's, not main.
                    seen.lock().unwrap().push(tenant::current().unwrap());
                    Ok(())
                }
            })
            .await
        }
    })
    .await;

    assert_eq!(report.succeeded.len(), 3);
    assert!(report.failed.is_empty());
    assert_eq!(
        *seen.lock().unwrap(),
        vec!["gallery_t1", "gallery_t2", "gallery_t3"]
    );
}

#[tokio::test]
async fn one_failing_tenant_does_not_stop_the_run() {
    let databases = vec![
        "gallery_t1".to_string(),
        "gallery_t2".to_string(),
        "gallery_t3".to_string(),
    ];

    let (report, binding_after) =
        tenant::with_tenant("pardaaf_main".to_string(), async move {
            let report = fan_out_tenants(databases, "test-job", |db| async move {
                if db == "gallery_t2" {
                    anyhow::bail!("injected failure");
                }
                Ok(())
            })
            .await;
            // After the run the outer main binding is back in place.
            (report, tenant::current().unwrap())
        })
        .await;

    assert_eq!(report.succeeded, vec!["gallery_t1", "gallery_t3"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "gallery_t2");
    assert!(report.failed[0].1.contains("injected failure"));
    assert_eq!(binding_after, "pardaaf_main");
}

#[tokio::test]
async fn empty_catalog_is_a_clean_noop() {
    let report = tenant::with_tenant("pardaaf_main".to_string(), async {
        fan_out_tenants(Vec::new(), "test-job", |_db| async { Ok(()) }).await
    })
    .await;

    assert!(report.succeeded.is_empty());
    assert!(report.failed.is_empty());
}
