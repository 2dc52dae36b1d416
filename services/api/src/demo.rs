use crate::infra::{
    demo_origin, InMemoryEmergencyRepository, InMemoryProviderDirectory,
    InMemoryScheduleRepository,
};
use clap::Args;
use serde_json::json;
use std::sync::Arc;
use vet_dispatch::availability::{AvailabilityService, ScheduleManager, SLOT_MINUTES};
use vet_dispatch::config::DispatchConfig;
use vet_dispatch::dispatch::{
    DispatchError, EmergencyDispatcher, EmergencySubmission, HaversineGeoProvider, PetId,
};
use vet_dispatch::error::AppError;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Urgency level for the scripted request (low, medium, high)
    #[arg(long, default_value = "high")]
    pub(crate) urgency: String,
    /// Pet identifier attached to the request
    #[arg(long, default_value = "pet-demo")]
    pub(crate) pet: String,
    /// Cancel the request after assignment instead of completing the visit
    #[arg(long)]
    pub(crate) cancel: bool,
}

#[derive(Args, Debug)]
pub(crate) struct TimeOptionsArgs {
    /// Minutes between options; must evenly divide a day
    #[arg(long, default_value_t = SLOT_MINUTES)]
    pub(crate) granularity: u16,
}

pub(crate) fn run_time_options(args: TimeOptionsArgs) -> Result<(), AppError> {
    let options = ScheduleManager::new()
        .list_time_options(args.granularity)
        .map_err(vet_dispatch::availability::AvailabilityError::from)?;
    for option in options {
        println!("{option}");
    }
    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        urgency,
        pet,
        cancel,
    } = args;

    let config = DispatchConfig::default();
    let availability = AvailabilityService::new(Arc::new(InMemoryScheduleRepository::default()));
    let dispatcher = EmergencyDispatcher::new(
        Arc::new(InMemoryEmergencyRepository::default()),
        Arc::new(InMemoryProviderDirectory::seeded()),
        Arc::new(HaversineGeoProvider::new(config.average_speed_kmh)),
        &config,
    );

    let request = dispatcher.submit(EmergencySubmission {
        pet_id: PetId(pet),
        description: "Demo: labrador collapsed after a run, shallow breathing".to_string(),
        urgency_level: urgency,
        origin_location: Some(demo_origin()),
    })?;

    let ranked = match dispatcher.rank_candidates(&request.id).await {
        Ok(ranked) => ranked,
        Err(DispatchError::NoCandidates { .. }) => {
            println!("No providers are currently available.");
            return Ok(());
        }
        Err(other) => return Err(other.into()),
    };

    let Some(chosen) = ranked
        .candidates
        .first()
        .map(|candidate| candidate.provider_id.clone())
    else {
        return Ok(());
    };
    let schedule = availability.view(&chosen)?;
    dispatcher.assign(&request.id, &chosen)?;

    if cancel {
        dispatcher.cancel(&request.id, "demo cancellation")?;
    } else {
        dispatcher.mark_en_route(&request.id)?;
        dispatcher.mark_attended(&request.id)?;
    }

    let summary = json!({
        "request": dispatcher.describe(&request.id)?,
        "candidates": ranked.candidates,
        "excluded": ranked.excluded,
        "assigned_provider_schedule": schedule,
        "history": dispatcher.history(&request.id)?,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
