//! Background scheduled tasks for the application.
//!
//! One detached tokio loop per membership sweep (expiry, auto-renewal,
//! reminders, grace-period). Every sweep is idempotent and absorbs
//! per-record failures, so a loop iteration can always run to completion
//! and a crashed process can simply start the loops again.

use crate::services::MembershipService;

/// Spawn all background tasks. Detaches via `tokio::spawn`; does not block.
pub fn spawn_all(membership_service: MembershipService) {
    // Expiry check every 6 hours.
    {
        let svc = membership_service.clone();
        tokio::spawn(async move {
            loop {
                match svc.check_and_update_expired_memberships().await {
                    Ok(n) if n > 0 => log::info!("expired memberships processed: {n}"),
                    Ok(_) => {}
                    Err(e) => log::error!("membership expiry sweep failed: {e:?}"),
                }
                tokio::time::sleep(std::time::Duration::from_secs(6 * 3600)).await;
            }
        });
    }

    // Auto-renewal attempts, daily.
    {
        let svc = membership_service.clone();
        tokio::spawn(async move {
            loop {
                match svc.process_auto_renewals().await {
                    Ok(n) if n > 0 => log::info!("memberships auto-renewed: {n}"),
                    Ok(_) => {}
                    Err(e) => log::error!("auto-renewal sweep failed: {e:?}"),
                }
                tokio::time::sleep(std::time::Duration::from_secs(24 * 3600)).await;
            }
        });
    }

    // Renewal reminders (30/14/7 days), daily.
    {
        let svc = membership_service.clone();
        tokio::spawn(async move {
            loop {
                match svc.send_renewal_reminders().await {
                    Ok(n) if n > 0 => log::info!("renewal reminders sent: {n}"),
                    Ok(_) => {}
                    Err(e) => log::error!("renewal reminder sweep failed: {e:?}"),
                }
                tokio::time::sleep(std::time::Duration::from_secs(24 * 3600)).await;
            }
        });
    }

    // Grace-period expirations, daily.
    {
        let svc = membership_service;
        tokio::spawn(async move {
            loop {
                match svc.process_grace_period_expirations().await {
                    Ok(n) if n > 0 => log::info!("memberships suspended after grace: {n}"),
                    Ok(_) => {}
                    Err(e) => log::error!("grace-period sweep failed: {e:?}"),
                }
                tokio::time::sleep(std::time::Duration::from_secs(24 * 3600)).await;
            }
        });
    }
}
